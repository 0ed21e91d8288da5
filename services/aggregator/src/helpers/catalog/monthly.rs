//! One row per beneficiary case per month.

use crate::helpers::descriptor::{
    col, def, index, ColumnDef, HelperDescriptor, Join, JoinKind, QueryShape, ScratchSpec, Scope,
    SelectSpec, TableRef, Validation,
};

use super::{CCS_RECORD_CASES, CHILD_HEALTH_CASES};

const CASE_AGE_COLUMNS: &[ColumnDef] = &[
    def("case_id", "TEXT NOT NULL"),
    def("state_id", "TEXT"),
    def("supervisor_id", "TEXT NOT NULL"),
    def("awc_id", "TEXT"),
    def("age_in_months", "INTEGER"),
    def("valid_in_month", "SMALLINT"),
];

const AGE_IN_MONTHS: &str = "(EXTRACT(YEAR FROM age(:month_start::timestamp, ucr.dob::timestamp)) * 12 + EXTRACT(MONTH FROM age(:month_start::timestamp, ucr.dob::timestamp)))::integer";

/// Children registered at an AWC with their age at the start of the month.
pub static CHILD_HEALTH_MONTHLY: HelperDescriptor = HelperDescriptor {
    key: "child-health-monthly",
    target: "child_health_monthly",
    scope: Scope::Global,
    sources: &[CHILD_HEALTH_CASES],
    depends_on: &[
        "thr-forms-child-health",
        "sam-mam-form",
        "growth-monitoring-forms",
        "daily-feeding-forms",
    ],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[ScratchSpec {
        name: "chm_case_ages",
        columns: CASE_AGE_COLUMNS,
        select: SelectSpec {
            from: TableRef::Source("static-child_health_cases"),
            alias: "ucr",
            joins: &[],
            filters: &[
                "ucr.opened_on < :next_month_start",
                "(ucr.closed_on IS NULL OR ucr.closed_on >= :month_start)",
                "ucr.dob < :next_month_start",
            ],
            columns: &[
                col("case_id", "ucr.doc_id"),
                col("state_id", "ucr.state_id"),
                col("supervisor_id", "ucr.supervisor_id"),
                col("awc_id", "ucr.awc_id"),
                col("age_in_months", AGE_IN_MONTHS),
                col(
                    "valid_in_month",
                    "CASE WHEN ucr.dob > :month_start::date - INTERVAL '72 months' THEN 1 ELSE 0 END",
                ),
            ],
            group_by: &[],
        },
        distribute: true,
    }],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Scratch("chm_case_ages"),
        alias: "a",
        joins: &[
            Join {
                kind: JoinKind::Inner,
                table: TableRef::Source("static-child_health_cases"),
                alias: "c",
                on: "c.supervisor_id = a.supervisor_id AND c.doc_id = a.case_id",
            },
            Join {
                kind: JoinKind::Left,
                table: TableRef::Fact("icds_dashboard_child_health_thr_forms"),
                alias: "thr",
                on: "thr.month = :month_start AND thr.supervisor_id = a.supervisor_id AND thr.case_id = a.case_id",
            },
            Join {
                kind: JoinKind::Left,
                table: TableRef::Fact("icds_dashboard_growth_monitoring_forms"),
                alias: "gm",
                on: "gm.month = :month_start AND gm.supervisor_id = a.supervisor_id AND gm.case_id = a.case_id",
            },
            Join {
                kind: JoinKind::Left,
                table: TableRef::Fact("icds_dashboard_sam_mam_forms"),
                alias: "sam",
                on: "sam.month = :month_start AND sam.supervisor_id = a.supervisor_id AND sam.case_id = a.case_id",
            },
            Join {
                kind: JoinKind::Left,
                table: TableRef::Fact("icds_dashboard_daily_feeding_forms"),
                alias: "df",
                on: "df.month = :month_start AND df.supervisor_id = a.supervisor_id AND df.case_id = a.case_id",
            },
        ],
        filters: &[],
        columns: &[
            col("state_id", "a.state_id"),
            col("supervisor_id", "a.supervisor_id"),
            col("awc_id", "a.awc_id"),
            col("case_id", "a.case_id"),
            col("month", ":month_start"),
            col("sex", "c.sex"),
            col("dob", "c.dob"),
            col("age_in_months", "a.age_in_months"),
            col(
                "age_tranche",
                "CASE WHEN a.age_in_months <= 6 THEN '6' WHEN a.age_in_months <= 12 THEN '12' WHEN a.age_in_months <= 24 THEN '24' WHEN a.age_in_months <= 36 THEN '36' WHEN a.age_in_months <= 48 THEN '48' WHEN a.age_in_months <= 60 THEN '60' WHEN a.age_in_months <= 72 THEN '72' ELSE NULL END",
            ),
            col("caste", "COALESCE(c.caste, 'other')"),
            col("disabled", "COALESCE(c.disabled, 'no')"),
            col("minority", "COALESCE(c.minority, 'no')"),
            col("resident", "COALESCE(c.resident, 'no')"),
            col("valid_in_month", "a.valid_in_month"),
            col(
                "thr_eligible",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months > 6 AND a.age_in_months <= 36 THEN 1 ELSE 0 END",
            ),
            col(
                "pse_eligible",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months > 36 AND a.age_in_months <= 72 THEN 1 ELSE 0 END",
            ),
            col(
                "wer_eligible",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months <= 60 THEN 1 ELSE 0 END",
            ),
            col(
                "num_rations_distributed",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months > 6 AND a.age_in_months <= 36 THEN COALESCE(thr.days_ration_given_child, 0) ELSE NULL END",
            ),
            col("days_ration_given_child", "thr.days_ration_given_child"),
            col(
                "pse_days_attended",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months > 36 AND a.age_in_months <= 72 THEN COALESCE(df.sum_attended_child_ids, 0) ELSE NULL END",
            ),
            col("lunch_count", "COALESCE(df.lunch_count, 0)"),
            col(
                "nutrition_status_weighed",
                "CASE WHEN a.valid_in_month = 1 AND a.age_in_months <= 60 AND gm.weight_child IS NOT NULL AND gm.latest_time_end_processed >= :month_start THEN 1 ELSE 0 END",
            ),
            col(
                "current_month_nutrition_status",
                "CASE WHEN a.valid_in_month = 0 OR a.age_in_months > 60 THEN NULL WHEN gm.latest_time_end_processed IS NULL OR gm.latest_time_end_processed < :month_start THEN 'unweighed' WHEN gm.zscore_grading_wfa = 1 THEN 'severely_underweight' WHEN gm.zscore_grading_wfa = 2 THEN 'moderately_underweight' WHEN gm.zscore_grading_wfa = 3 THEN 'normal' ELSE 'unweighed' END",
            ),
            col("sam_mam_visit_date_1", "sam.sam_mam_visit_date_1"),
        ],
        group_by: &[],
    }),
    indexes: &[
        index("awc", &["awc_id"]),
        index("case", &["case_id"]),
    ],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("doc_id"),
        Validation::NotNull("dob"),
    ],
};

/// Pregnant and lactating women registered at an AWC.
///
/// Lactating covers deliveries in the six months before the month ends.
pub static CCS_RECORD_MONTHLY: HelperDescriptor = HelperDescriptor {
    key: "ccs-record-monthly",
    target: "ccs_record_monthly",
    scope: Scope::Global,
    sources: &[CCS_RECORD_CASES],
    depends_on: &["thr-forms-ccs-record"],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 6,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-ccs_record_cases"),
        alias: "ucr",
        joins: &[Join {
            kind: JoinKind::Left,
            table: TableRef::Fact("icds_dashboard_ccs_record_thr_forms"),
            alias: "thr",
            on: "thr.month = :month_start AND thr.supervisor_id = ucr.supervisor_id AND thr.case_id = ucr.doc_id",
        }],
        filters: &[
            "ucr.opened_on < :next_month_start",
            "(ucr.closed_on IS NULL OR ucr.closed_on >= :month_start)",
            "((ucr.add IS NULL AND ucr.edd >= :month_start) OR (ucr.add >= :lookback_start AND ucr.add < :next_month_start))",
        ],
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("awc_id", "ucr.awc_id"),
            col("case_id", "ucr.doc_id"),
            col("month", ":month_start"),
            col("edd", "ucr.edd"),
            col("add", "ucr.add"),
            col("caste", "COALESCE(ucr.caste, 'other')"),
            col("disabled", "COALESCE(ucr.disabled, 'no')"),
            col("minority", "COALESCE(ucr.minority, 'no')"),
            col("resident", "COALESCE(ucr.resident, 'no')"),
            col(
                "pregnant",
                "CASE WHEN ucr.add IS NULL AND ucr.edd >= :month_start THEN 1 ELSE 0 END",
            ),
            col(
                "lactating",
                "CASE WHEN ucr.add >= :lookback_start AND ucr.add < :next_month_start THEN 1 ELSE 0 END",
            ),
            col("valid_in_month", "1"),
            col("thr_eligible", "1"),
            col("num_rations_distributed", "COALESCE(thr.days_ration_given_mother, 0)"),
            col("days_ration_given_mother", "thr.days_ration_given_mother"),
        ],
        group_by: &[],
    }),
    indexes: &[
        index("awc", &["awc_id"]),
        index("case", &["case_id"]),
    ],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("doc_id"),
    ],
};
