//! Per-state aggregates of submitted forms.

use crate::helpers::descriptor::{
    col, index, EventSeries, HelperDescriptor, LatestValuesSpec, QueryShape, RankedEventsSpec,
    Scope, SelectSpec, TableRef, Validation,
};

use super::{
    DAILY_FEEDING_FORMS, GROWTH_MONITORING_FORMS, INFRASTRUCTURE_FORMS, SAM_MAM_VISITS, THR_FORMS,
};

/// Take-home ration days per child. Capped at the smallint maximum.
pub static THR_CHILD_HEALTH: HelperDescriptor = HelperDescriptor {
    key: "thr-forms-child-health",
    target: "icds_dashboard_child_health_thr_forms",
    scope: Scope::PerState,
    sources: &[THR_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-dashboard_thr_forms"),
        alias: "ucr",
        joins: &[],
        filters: &["ucr.child_health_case_id IS NOT NULL"],
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("month", ":month_start"),
            col("case_id", "ucr.child_health_case_id"),
            col("latest_time_end_processed", "MAX(ucr.timeend)"),
            col(
                "days_ration_given_child",
                "CASE WHEN SUM(ucr.days_ration_given_child) > 32767 THEN 32767 ELSE SUM(ucr.days_ration_given_child) END",
            ),
        ],
        group_by: &["ucr.state_id", "ucr.supervisor_id", "ucr.child_health_case_id"],
    }),
    indexes: &[index("case", &["case_id"])],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NonNegative("days_ration_given_child"),
    ],
};

/// Take-home ration days per pregnant or lactating woman.
pub static THR_CCS_RECORD: HelperDescriptor = HelperDescriptor {
    key: "thr-forms-ccs-record",
    target: "icds_dashboard_ccs_record_thr_forms",
    scope: Scope::PerState,
    sources: &[THR_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-dashboard_thr_forms"),
        alias: "ucr",
        joins: &[],
        filters: &["ucr.ccs_record_case_id IS NOT NULL"],
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("month", ":month_start"),
            col("case_id", "ucr.ccs_record_case_id"),
            col("latest_time_end_processed", "MAX(ucr.timeend)"),
            col(
                "days_ration_given_mother",
                "CASE WHEN SUM(ucr.days_ration_given_mother) > 32767 THEN 32767 ELSE SUM(ucr.days_ration_given_mother) END",
            ),
        ],
        group_by: &["ucr.state_id", "ucr.supervisor_id", "ucr.ccs_record_case_id"],
    }),
    indexes: &[index("case", &["case_id"])],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NonNegative("days_ration_given_mother"),
    ],
};

/// Dates of the first four SAM/MAM visits and poshan panchayats in the month.
pub static SAM_MAM: HelperDescriptor = HelperDescriptor {
    key: "sam-mam-form",
    target: "icds_dashboard_sam_mam_forms",
    scope: Scope::PerState,
    sources: &[SAM_MAM_VISITS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::RankedEvents(RankedEventsSpec {
        source: "static-sam_mam_visit",
        keys: &["state_id", "supervisor_id", "child_health_case_id"],
        entity_as: Some("case_id"),
        submitted_at: "timeend",
        series: &[
            EventSeries {
                column: "last_visit_date",
                output_prefix: "sam_mam_visit_date",
                count: 4,
            },
            EventSeries {
                column: "poshan_panchayat_date",
                output_prefix: "poshan_panchayat_date",
                count: 4,
            },
        ],
    }),
    indexes: &[index("case", &["case_id"])],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("child_health_case_id"),
    ],
};

/// Dates of the first four poshan panchayats held at each AWC in the month.
pub static SAM_MAM_PANCHAYAT: HelperDescriptor = HelperDescriptor {
    key: "sam-mam-panchayat-form",
    target: "icds_dashboard_sam_mam_panchayat_forms",
    scope: Scope::PerState,
    sources: &[SAM_MAM_VISITS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::RankedEvents(RankedEventsSpec {
        source: "static-sam_mam_visit",
        keys: &["state_id", "supervisor_id", "awc_id"],
        entity_as: None,
        submitted_at: "timeend",
        series: &[EventSeries {
            column: "poshan_panchayat_date",
            output_prefix: "poshan_panchayat_date",
            count: 4,
        }],
    }),
    indexes: &[index("awc", &["awc_id"])],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("awc_id"),
    ],
};

/// Latest measurement of each growth indicator per child.
pub static GROWTH_MONITORING: HelperDescriptor = HelperDescriptor {
    key: "growth-monitoring-forms",
    target: "icds_dashboard_growth_monitoring_forms",
    scope: Scope::PerState,
    sources: &[GROWTH_MONITORING_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 6,
    scratch: &[],
    query: QueryShape::LatestValues(LatestValuesSpec {
        source: "static-dashboard_growth_monitoring_forms",
        key: "child_health_case_id",
        key_as: "case_id",
        carry: &["state_id", "supervisor_id"],
        time_column: "timeend",
        latest_as: "latest_time_end_processed",
        values: &[
            "weight_child",
            "height_child",
            "zscore_grading_wfa",
            "zscore_grading_hfa",
            "zscore_grading_wfh",
            "muac_grading",
        ],
    }),
    indexes: &[index("case", &["case_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};

/// Latest reported state of each AWC's infrastructure.
pub static INFRASTRUCTURE: HelperDescriptor = HelperDescriptor {
    key: "awc-infrastructure",
    target: "icds_dashboard_infrastructure_forms",
    scope: Scope::PerState,
    sources: &[INFRASTRUCTURE_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 6,
    scratch: &[],
    query: QueryShape::LatestValues(LatestValuesSpec {
        source: "static-infrastructure_form_v2",
        key: "awc_id",
        key_as: "awc_id",
        carry: &["state_id", "supervisor_id"],
        time_column: "timeend",
        latest_as: "latest_time_end_processed",
        values: &[
            "where_housed",
            "provided_building",
            "kitchen",
            "toilet_facility",
            "preschool_kit_available",
            "adult_scale_available",
            "infant_scale_available",
            "electricity_awc",
            "clean_water",
        ],
    }),
    indexes: &[index("awc", &["awc_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};

/// Hot-cooked meal and attendance counts per child.
pub static DAILY_FEEDING: HelperDescriptor = HelperDescriptor {
    key: "daily-feeding-forms",
    target: "icds_dashboard_daily_feeding_forms",
    scope: Scope::PerState,
    sources: &[DAILY_FEEDING_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-daily_feeding_forms"),
        alias: "ucr",
        joins: &[],
        filters: &["ucr.child_health_case_id IS NOT NULL"],
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("month", ":month_start"),
            col("case_id", "ucr.child_health_case_id"),
            col("latest_time_end_processed", "MAX(ucr.timeend)"),
            col("sum_attended_child_ids", "SUM(COALESCE(ucr.attended_child, 0))"),
            col("lunch_count", "SUM(COALESCE(ucr.lunch, 0))"),
        ],
        group_by: &["ucr.state_id", "ucr.supervisor_id", "ucr.child_health_case_id"],
    }),
    indexes: &[index("case", &["case_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};
