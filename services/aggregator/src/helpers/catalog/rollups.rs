//! Location rollups of the monthly case tables and the AWC summary.

use crate::helpers::descriptor::{
    attr, col, def, index, max, sum, ColumnDef, HelperDescriptor, Join, JoinKind, QueryShape,
    RollupSpec, ScratchSpec, Scope, SelectSpec, TableRef, Validation,
};

use super::person::{OPEN_IN_MONTH, STATUS_JOINS, UNMIGRATED};
use super::{PERSON_CASES, VHND_FORMS, VISITORBOOK_FORMS};

/// Joins a monthly case table (alias `m`) to the leaf rows of the location
/// snapshot for the same month.
const LEAF_LOCATION: Join = Join {
    kind: JoinKind::Inner,
    table: TableRef::Fact("awc_location_months"),
    alias: "loc",
    on: "loc.month = :month_start AND loc.aggregation_level = 5 AND loc.supervisor_id = m.supervisor_id AND loc.awc_id = m.awc_id",
};

const LOCATION_GROUPS: [&str; 5] = [
    "loc.state_id",
    "loc.district_id",
    "loc.block_id",
    "loc.supervisor_id",
    "loc.awc_id",
];

pub static AGG_CHILD_HEALTH: HelperDescriptor = HelperDescriptor {
    key: "agg-child-health",
    target: "agg_child_health",
    scope: Scope::Global,
    sources: &[],
    depends_on: &["awc-location", "child-health-monthly"],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Rollup(RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Fact("child_health_monthly"),
            alias: "m",
            joins: &[LEAF_LOCATION],
            filters: &["m.month = :month_start"],
            columns: &[
                col("state_id", "loc.state_id"),
                col("district_id", "loc.district_id"),
                col("block_id", "loc.block_id"),
                col("supervisor_id", "loc.supervisor_id"),
                col("awc_id", "loc.awc_id"),
                col("month", ":month_start"),
                col("aggregation_level", "5"),
                col("gender", "m.sex"),
                col("age_tranche", "m.age_tranche"),
                col("caste", "m.caste"),
                col("disabled", "m.disabled"),
                col("minority", "m.minority"),
                col("resident", "m.resident"),
                col("valid_in_month", "SUM(m.valid_in_month)"),
                col("thr_eligible", "SUM(m.thr_eligible)"),
                col(
                    "rations_25_plus_distributed",
                    "SUM(CASE WHEN m.thr_eligible = 1 AND m.num_rations_distributed >= 25 THEN 1 ELSE 0 END)",
                ),
                col("days_ration_given_child", "SUM(m.days_ration_given_child)"),
                col("pse_eligible", "SUM(m.pse_eligible)"),
                col(
                    "pse_attended_16_days",
                    "SUM(CASE WHEN m.pse_eligible = 1 AND m.pse_days_attended >= 16 THEN 1 ELSE 0 END)",
                ),
                col("wer_eligible", "SUM(m.wer_eligible)"),
                col("nutrition_status_weighed", "SUM(m.nutrition_status_weighed)"),
                col(
                    "nutrition_status_normal",
                    "SUM(CASE WHEN m.current_month_nutrition_status = 'normal' THEN 1 ELSE 0 END)",
                ),
                col(
                    "nutrition_status_moderately_underweight",
                    "SUM(CASE WHEN m.current_month_nutrition_status = 'moderately_underweight' THEN 1 ELSE 0 END)",
                ),
                col(
                    "nutrition_status_severely_underweight",
                    "SUM(CASE WHEN m.current_month_nutrition_status = 'severely_underweight' THEN 1 ELSE 0 END)",
                ),
            ],
            group_by: &[
                LOCATION_GROUPS[0],
                LOCATION_GROUPS[1],
                LOCATION_GROUPS[2],
                LOCATION_GROUPS[3],
                LOCATION_GROUPS[4],
                "m.sex",
                "m.age_tranche",
                "m.caste",
                "m.disabled",
                "m.minority",
                "m.resident",
            ],
        },
        level_attributes: &[],
        dimensions: &["gender", "age_tranche"],
        blanked: &["caste", "disabled", "minority", "resident"],
        measures: &[
            sum("valid_in_month"),
            sum("thr_eligible"),
            sum("rations_25_plus_distributed"),
            sum("days_ration_given_child"),
            sum("pse_eligible"),
            sum("pse_attended_16_days"),
            sum("wer_eligible"),
            sum("nutrition_status_weighed"),
            sum("nutrition_status_normal"),
            sum("nutrition_status_moderately_underweight"),
            sum("nutrition_status_severely_underweight"),
        ],
    }),
    indexes: &[index("level_state", &["aggregation_level", "state_id"])],
    validations: &[],
};

pub static AGG_CCS_RECORD: HelperDescriptor = HelperDescriptor {
    key: "agg-ccs-record",
    target: "agg_ccs_record",
    scope: Scope::Global,
    sources: &[],
    depends_on: &["awc-location", "ccs-record-monthly"],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Rollup(RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Fact("ccs_record_monthly"),
            alias: "m",
            joins: &[LEAF_LOCATION],
            filters: &["m.month = :month_start"],
            columns: &[
                col("state_id", "loc.state_id"),
                col("district_id", "loc.district_id"),
                col("block_id", "loc.block_id"),
                col("supervisor_id", "loc.supervisor_id"),
                col("awc_id", "loc.awc_id"),
                col("month", ":month_start"),
                col("aggregation_level", "5"),
                col(
                    "ccs_status",
                    "CASE WHEN m.pregnant = 1 THEN 'pregnant' ELSE 'lactating' END",
                ),
                col("caste", "m.caste"),
                col("disabled", "m.disabled"),
                col("minority", "m.minority"),
                col("resident", "m.resident"),
                col("valid_in_month", "SUM(m.valid_in_month)"),
                col("pregnant", "SUM(m.pregnant)"),
                col("lactating", "SUM(m.lactating)"),
                col("thr_eligible", "SUM(m.thr_eligible)"),
                col(
                    "rations_21_plus_distributed",
                    "SUM(CASE WHEN m.thr_eligible = 1 AND m.num_rations_distributed >= 21 THEN 1 ELSE 0 END)",
                ),
                col("days_ration_given_mother", "SUM(m.days_ration_given_mother)"),
            ],
            group_by: &[
                LOCATION_GROUPS[0],
                LOCATION_GROUPS[1],
                LOCATION_GROUPS[2],
                LOCATION_GROUPS[3],
                LOCATION_GROUPS[4],
                "CASE WHEN m.pregnant = 1 THEN 'pregnant' ELSE 'lactating' END",
                "m.caste",
                "m.disabled",
                "m.minority",
                "m.resident",
            ],
        },
        level_attributes: &[],
        dimensions: &["ccs_status"],
        blanked: &["caste", "disabled", "minority", "resident"],
        measures: &[
            sum("valid_in_month"),
            sum("pregnant"),
            sum("lactating"),
            sum("thr_eligible"),
            sum("rations_21_plus_distributed"),
            sum("days_ration_given_mother"),
        ],
    }),
    indexes: &[index("level_state", &["aggregation_level", "state_id"])],
    validations: &[],
};

const CHILD_SUMMARY_COLUMNS: &[ColumnDef] = &[
    def("supervisor_id", "TEXT NOT NULL"),
    def("awc_id", "TEXT NOT NULL"),
    def("cases_child_health", "INTEGER"),
    def("cases_child_health_thr_eligible", "INTEGER"),
    def("wer_eligible", "INTEGER"),
    def("wer_weighed", "INTEGER"),
];

const CCS_SUMMARY_COLUMNS: &[ColumnDef] = &[
    def("supervisor_id", "TEXT NOT NULL"),
    def("awc_id", "TEXT NOT NULL"),
    def("cases_ccs_pregnant", "INTEGER"),
    def("cases_ccs_lactating", "INTEGER"),
];

/// One row per AWC and location level with what the AWC offered and served.
pub static AGG_AWC: HelperDescriptor = HelperDescriptor {
    key: "agg-awc",
    target: "agg_awc",
    scope: Scope::Global,
    sources: &[],
    depends_on: &[
        "awc-location",
        "daily-attendance",
        "awc-infrastructure",
        "child-health-monthly",
        "ccs-record-monthly",
    ],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[
        ScratchSpec {
            name: "agg_awc_child_summary",
            columns: CHILD_SUMMARY_COLUMNS,
            select: SelectSpec {
                from: TableRef::Fact("child_health_monthly"),
                alias: "chm",
                joins: &[],
                filters: &["chm.month = :month_start", "chm.awc_id IS NOT NULL"],
                columns: &[
                    col("supervisor_id", "chm.supervisor_id"),
                    col("awc_id", "chm.awc_id"),
                    col("cases_child_health", "SUM(chm.valid_in_month)"),
                    col("cases_child_health_thr_eligible", "SUM(chm.thr_eligible)"),
                    col("wer_eligible", "SUM(chm.wer_eligible)"),
                    col("wer_weighed", "SUM(chm.nutrition_status_weighed)"),
                ],
                group_by: &["chm.supervisor_id", "chm.awc_id"],
            },
            distribute: true,
        },
        ScratchSpec {
            name: "agg_awc_ccs_summary",
            columns: CCS_SUMMARY_COLUMNS,
            select: SelectSpec {
                from: TableRef::Fact("ccs_record_monthly"),
                alias: "ccs",
                joins: &[],
                filters: &["ccs.month = :month_start", "ccs.awc_id IS NOT NULL"],
                columns: &[
                    col("supervisor_id", "ccs.supervisor_id"),
                    col("awc_id", "ccs.awc_id"),
                    col("cases_ccs_pregnant", "SUM(ccs.pregnant)"),
                    col("cases_ccs_lactating", "SUM(ccs.lactating)"),
                ],
                group_by: &["ccs.supervisor_id", "ccs.awc_id"],
            },
            distribute: true,
        },
    ],
    query: QueryShape::Rollup(RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Fact("awc_location_months"),
            alias: "loc",
            joins: &[
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Fact("daily_attendance"),
                    alias: "da",
                    on: "da.month = :month_start AND da.supervisor_id = loc.supervisor_id AND da.awc_id = loc.awc_id",
                },
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Scratch("agg_awc_child_summary"),
                    alias: "ch",
                    on: "ch.supervisor_id = loc.supervisor_id AND ch.awc_id = loc.awc_id",
                },
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Scratch("agg_awc_ccs_summary"),
                    alias: "ccs",
                    on: "ccs.supervisor_id = loc.supervisor_id AND ccs.awc_id = loc.awc_id",
                },
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Fact("icds_dashboard_infrastructure_forms"),
                    alias: "infra",
                    on: "infra.month = :month_start AND infra.supervisor_id = loc.supervisor_id AND infra.awc_id = loc.awc_id",
                },
            ],
            filters: &["loc.month = :month_start", "loc.aggregation_level = 5"],
            columns: &[
                col("state_id", "loc.state_id"),
                col("district_id", "loc.district_id"),
                col("block_id", "loc.block_id"),
                col("supervisor_id", "loc.supervisor_id"),
                col("awc_id", "loc.awc_id"),
                col("month", ":month_start"),
                col("aggregation_level", "5"),
                col("state_name", "loc.state_name"),
                col("state_is_test", "loc.state_is_test"),
                col("district_name", "loc.district_name"),
                col("block_name", "loc.block_name"),
                col("supervisor_name", "loc.supervisor_name"),
                col("awc_name", "loc.awc_name"),
                col("awc_site_code", "loc.awc_site_code"),
                col("num_awcs", "1"),
                col(
                    "num_launched_awcs",
                    "CASE WHEN COALESCE(da.awc_days_open, 0) > 0 THEN 1 ELSE 0 END",
                ),
                col("awc_days_open", "COALESCE(da.awc_days_open, 0)"),
                col("awc_days_pse_conducted", "COALESCE(da.awc_days_pse_conducted, 0)"),
                col("cases_child_health", "COALESCE(ch.cases_child_health, 0)"),
                col(
                    "cases_child_health_thr_eligible",
                    "COALESCE(ch.cases_child_health_thr_eligible, 0)",
                ),
                col("wer_eligible", "COALESCE(ch.wer_eligible, 0)"),
                col("wer_weighed", "COALESCE(ch.wer_weighed, 0)"),
                col("cases_ccs_pregnant", "COALESCE(ccs.cases_ccs_pregnant, 0)"),
                col("cases_ccs_lactating", "COALESCE(ccs.cases_ccs_lactating, 0)"),
                col(
                    "infra_clean_water",
                    "CASE WHEN infra.clean_water = 1 THEN 1 ELSE 0 END",
                ),
                col(
                    "infra_functional_toilet",
                    "CASE WHEN infra.toilet_facility = 1 THEN 1 ELSE 0 END",
                ),
                col(
                    "infra_adult_weighing_scale",
                    "CASE WHEN infra.adult_scale_available = 1 THEN 1 ELSE 0 END",
                ),
                col(
                    "infra_infant_weighing_scale",
                    "CASE WHEN infra.infant_scale_available = 1 THEN 1 ELSE 0 END",
                ),
                col(
                    "electricity_awc",
                    "CASE WHEN infra.electricity_awc = 1 THEN 1 ELSE 0 END",
                ),
                col(
                    "infra_last_update_date",
                    "infra.latest_time_end_processed::date",
                ),
            ],
            group_by: &[],
        },
        level_attributes: &[
            attr(1, "state_name"),
            attr(1, "state_is_test"),
            attr(2, "district_name"),
            attr(3, "block_name"),
            attr(4, "supervisor_name"),
            attr(5, "awc_name"),
            attr(5, "awc_site_code"),
        ],
        dimensions: &[],
        blanked: &[],
        measures: &[
            sum("num_awcs"),
            sum("num_launched_awcs"),
            sum("awc_days_open"),
            sum("awc_days_pse_conducted"),
            sum("cases_child_health"),
            sum("cases_child_health_thr_eligible"),
            sum("wer_eligible"),
            sum("wer_weighed"),
            sum("cases_ccs_pregnant"),
            sum("cases_ccs_lactating"),
            sum("infra_clean_water"),
            sum("infra_functional_toilet"),
            sum("infra_adult_weighing_scale"),
            sum("infra_infant_weighing_scale"),
            sum("electricity_awc"),
            max("infra_last_update_date"),
        ],
    }),
    indexes: &[
        index("level_state", &["aggregation_level", "state_id"]),
        index("awc", &["awc_id"]),
    ],
    validations: &[],
};

const VISITOR_COLUMNS: &[ColumnDef] = &[
    def("awc_id", "TEXT NOT NULL"),
    def("visitor_icds_sup", "SMALLINT"),
    def("visitor_anm", "SMALLINT"),
    def("visitor_health_sup", "SMALLINT"),
    def("visitor_cdpo", "SMALLINT"),
    def("visitor_med_officer", "SMALLINT"),
    def("visitor_dpo", "SMALLINT"),
    def("visitor_officer_state", "SMALLINT"),
    def("visitor_officer_central", "SMALLINT"),
];

const VHND_COLUMNS: &[ColumnDef] = &[
    def("awc_id", "TEXT NOT NULL"),
    def("done_when_planned", "SMALLINT"),
    def("aww_present", "SMALLINT"),
    def("icds_sup", "SMALLINT"),
    def("asha_present", "SMALLINT"),
    def("anm_mpw", "SMALLINT"),
    def("health_edu_org", "SMALLINT"),
    def("display_tools", "SMALLINT"),
    def("thr_distr", "SMALLINT"),
    def("child_immu", "SMALLINT"),
    def("vit_a_given", "SMALLINT"),
    def("anc_today", "SMALLINT"),
    def("local_leader", "SMALLINT"),
    def("due_list_prep_immunization", "SMALLINT"),
    def("due_list_prep_vit_a", "SMALLINT"),
    def("due_list_prep_antenatal_checkup", "SMALLINT"),
];

const DEATH_COLUMNS: &[ColumnDef] = &[
    def("supervisor_id", "TEXT NOT NULL"),
    def("awc_id", "TEXT NOT NULL"),
    def("mother_death_permanent_resident", "INTEGER"),
    def("mother_death_temp_resident", "INTEGER"),
    def("pregnancy_death_permanent_resident", "INTEGER"),
    def("pregnancy_death_temp_resident", "INTEGER"),
    def("delivery_death_permanent_resident", "INTEGER"),
    def("delivery_death_temp_resident", "INTEGER"),
    def("pnc_death_permanent_resident", "INTEGER"),
    def("pnc_death_temp_resident", "INTEGER"),
];

/// Monthly progress report per AWC: supervisory visits, village health and
/// nutrition days, and deaths of women.
pub static AGG_MPR_AWC: HelperDescriptor = HelperDescriptor {
    key: "agg-mpr-awc",
    target: "agg_mpr_awc",
    scope: Scope::Global,
    sources: &[VISITORBOOK_FORMS, VHND_FORMS, PERSON_CASES],
    depends_on: &["awc-location", "migration-forms", "availing-service-forms"],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[
        ScratchSpec {
            name: "mpr_visitors",
            columns: VISITOR_COLUMNS,
            select: SelectSpec {
                from: TableRef::Source("static-visitorbook_forms"),
                alias: "ucr",
                joins: &[],
                filters: &[],
                columns: &[
                    col("awc_id", "ucr.awc_id"),
                    col("visitor_icds_sup", "CASE WHEN SUM(ucr.visitor_icds_sup) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_anm", "CASE WHEN SUM(ucr.visitor_anm) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_health_sup", "CASE WHEN SUM(ucr.visitor_health_sup) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_cdpo", "CASE WHEN SUM(ucr.visitor_cdpo) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_med_officer", "CASE WHEN SUM(ucr.visitor_med_officer) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_dpo", "CASE WHEN SUM(ucr.visitor_dpo) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_officer_state", "CASE WHEN SUM(ucr.visitor_officer_state) >= 1 THEN 1 ELSE 0 END"),
                    col("visitor_officer_central", "CASE WHEN SUM(ucr.visitor_officer_central) >= 1 THEN 1 ELSE 0 END"),
                ],
                group_by: &["ucr.awc_id"],
            },
            distribute: false,
        },
        ScratchSpec {
            name: "mpr_vhnd",
            columns: VHND_COLUMNS,
            select: SelectSpec {
                from: TableRef::Source("static-vhnd_form"),
                alias: "ucr",
                joins: &[],
                filters: &[
                    "ucr.submitted_on >= :month_start",
                    "ucr.submitted_on < :next_month_start",
                    "ucr.awc_id IS NOT NULL",
                ],
                columns: &[
                    col("awc_id", "ucr.awc_id"),
                    col("done_when_planned", "CASE WHEN SUM(ucr.done_when_planned) >= 1 THEN 1 ELSE 0 END"),
                    col("aww_present", "CASE WHEN SUM(ucr.aww_present) >= 1 THEN 1 ELSE 0 END"),
                    col("icds_sup", "CASE WHEN SUM(ucr.icds_sup) >= 1 THEN 1 ELSE 0 END"),
                    col("asha_present", "CASE WHEN SUM(ucr.asha_present) >= 1 THEN 1 ELSE 0 END"),
                    col("anm_mpw", "CASE WHEN SUM(ucr.anm_mpw) >= 1 THEN 1 ELSE 0 END"),
                    col("health_edu_org", "CASE WHEN SUM(ucr.health_edu_org) >= 1 THEN 1 ELSE 0 END"),
                    col("display_tools", "CASE WHEN SUM(ucr.display_tools) >= 1 THEN 1 ELSE 0 END"),
                    col("thr_distr", "CASE WHEN SUM(ucr.thr_distr) >= 1 THEN 1 ELSE 0 END"),
                    col("child_immu", "CASE WHEN SUM(ucr.child_immu) >= 1 THEN 1 ELSE 0 END"),
                    col("vit_a_given", "CASE WHEN SUM(ucr.vit_a_given) >= 1 THEN 1 ELSE 0 END"),
                    col("anc_today", "CASE WHEN SUM(ucr.anc_today) >= 1 THEN 1 ELSE 0 END"),
                    col("local_leader", "CASE WHEN SUM(ucr.local_leader) >= 1 THEN 1 ELSE 0 END"),
                    col("due_list_prep_immunization", "CASE WHEN SUM(ucr.due_list_prep_immunization) >= 1 THEN 1 ELSE 0 END"),
                    col("due_list_prep_vit_a", "CASE WHEN SUM(ucr.due_list_prep_vit_a) >= 1 THEN 1 ELSE 0 END"),
                    col("due_list_prep_antenatal_checkup", "CASE WHEN SUM(ucr.due_list_prep_antenatal_checkup) >= 1 THEN 1 ELSE 0 END"),
                ],
                group_by: &["ucr.awc_id"],
            },
            distribute: false,
        },
        ScratchSpec {
            name: "mpr_deaths",
            columns: DEATH_COLUMNS,
            select: SelectSpec {
                from: TableRef::Source("static-person_cases_v3"),
                alias: "ucr",
                joins: &STATUS_JOINS,
                filters: &[
                    OPEN_IN_MONTH[0],
                    OPEN_IN_MONTH[1],
                    "(av.is_registered IS DISTINCT FROM 0 OR av.registration_date::date >= :month_start)",
                    UNMIGRATED,
                    "ucr.supervisor_id IS NOT NULL",
                    "ucr.awc_id IS NOT NULL",
                    "ucr.sex = 'F'",
                    "ucr.date_death >= :month_start",
                    "ucr.date_death < :next_month_start",
                ],
                columns: &[
                    col("supervisor_id", "ucr.supervisor_id"),
                    col("awc_id", "ucr.awc_id"),
                    col("mother_death_permanent_resident", "count(*) FILTER (WHERE ucr.resident = 1 AND ucr.age_at_death_yrs >= 11)"),
                    col("mother_death_temp_resident", "count(*) FILTER (WHERE ucr.resident IS DISTINCT FROM 1 AND ucr.age_at_death_yrs >= 11)"),
                    col("pregnancy_death_permanent_resident", "count(*) FILTER (WHERE ucr.resident = 1 AND ucr.female_death_type = 'pregnant')"),
                    col("pregnancy_death_temp_resident", "count(*) FILTER (WHERE ucr.resident IS DISTINCT FROM 1 AND ucr.female_death_type = 'pregnant')"),
                    col("delivery_death_permanent_resident", "count(*) FILTER (WHERE ucr.resident = 1 AND ucr.female_death_type = 'delivery')"),
                    col("delivery_death_temp_resident", "count(*) FILTER (WHERE ucr.resident IS DISTINCT FROM 1 AND ucr.female_death_type = 'delivery')"),
                    col("pnc_death_permanent_resident", "count(*) FILTER (WHERE ucr.resident = 1 AND ucr.female_death_type = 'pnc')"),
                    col("pnc_death_temp_resident", "count(*) FILTER (WHERE ucr.resident IS DISTINCT FROM 1 AND ucr.female_death_type = 'pnc')"),
                ],
                group_by: &["ucr.supervisor_id", "ucr.awc_id"],
            },
            distribute: true,
        },
    ],
    query: QueryShape::Rollup(RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Fact("awc_location_months"),
            alias: "loc",
            joins: &[
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Scratch("mpr_visitors"),
                    alias: "v",
                    on: "v.awc_id = loc.awc_id",
                },
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Scratch("mpr_vhnd"),
                    alias: "vh",
                    on: "vh.awc_id = loc.awc_id",
                },
                Join {
                    kind: JoinKind::Left,
                    table: TableRef::Scratch("mpr_deaths"),
                    alias: "d",
                    on: "d.supervisor_id = loc.supervisor_id AND d.awc_id = loc.awc_id",
                },
            ],
            filters: &["loc.month = :month_start", "loc.aggregation_level = 5"],
            columns: &[
                col("state_id", "loc.state_id"),
                col("district_id", "loc.district_id"),
                col("block_id", "loc.block_id"),
                col("supervisor_id", "loc.supervisor_id"),
                col("awc_id", "loc.awc_id"),
                col("month", ":month_start"),
                col("aggregation_level", "5"),
                col("state_is_test", "loc.state_is_test"),
                col("district_is_test", "loc.district_is_test"),
                col("block_is_test", "loc.block_is_test"),
                col("supervisor_is_test", "loc.supervisor_is_test"),
                col("awc_is_test", "loc.awc_is_test"),
                col("visitor_icds_sup", "COALESCE(v.visitor_icds_sup, 0)"),
                col("visitor_anm", "COALESCE(v.visitor_anm, 0)"),
                col("visitor_health_sup", "COALESCE(v.visitor_health_sup, 0)"),
                col("visitor_cdpo", "COALESCE(v.visitor_cdpo, 0)"),
                col("visitor_med_officer", "COALESCE(v.visitor_med_officer, 0)"),
                col("visitor_dpo", "COALESCE(v.visitor_dpo, 0)"),
                col("visitor_officer_state", "COALESCE(v.visitor_officer_state, 0)"),
                col("visitor_officer_central", "COALESCE(v.visitor_officer_central, 0)"),
                col("vhnd_done_when_planned", "COALESCE(vh.done_when_planned, 0)"),
                col("vhnd_with_aww_present", "COALESCE(vh.aww_present, 0)"),
                col("vhnd_with_icds_sup", "COALESCE(vh.icds_sup, 0)"),
                col("vhnd_with_asha_present", "COALESCE(vh.asha_present, 0)"),
                col("vhnd_with_anm_mpw", "COALESCE(vh.anm_mpw, 0)"),
                col("vhnd_with_health_edu_org", "COALESCE(vh.health_edu_org, 0)"),
                col("vhnd_with_display_tools", "COALESCE(vh.display_tools, 0)"),
                col("vhnd_with_thr_distr", "COALESCE(vh.thr_distr, 0)"),
                col("vhnd_with_child_immu", "COALESCE(vh.child_immu, 0)"),
                col("vhnd_with_vit_a_given", "COALESCE(vh.vit_a_given, 0)"),
                col("vhnd_with_anc_today", "COALESCE(vh.anc_today, 0)"),
                col("vhnd_with_local_leader", "COALESCE(vh.local_leader, 0)"),
                col("vhnd_with_due_list_prep_immunization", "COALESCE(vh.due_list_prep_immunization, 0)"),
                col("vhnd_with_due_list_prep_vita_a", "COALESCE(vh.due_list_prep_vit_a, 0)"),
                col("vhnd_with_due_list_prep_antenatal_checkup", "COALESCE(vh.due_list_prep_antenatal_checkup, 0)"),
                col("mother_death_permanent_resident", "COALESCE(d.mother_death_permanent_resident, 0)"),
                col("mother_death_temp_resident", "COALESCE(d.mother_death_temp_resident, 0)"),
                col("pregnancy_death_permanent_resident", "COALESCE(d.pregnancy_death_permanent_resident, 0)"),
                col("pregnancy_death_temp_resident", "COALESCE(d.pregnancy_death_temp_resident, 0)"),
                col("delivery_death_permanent_resident", "COALESCE(d.delivery_death_permanent_resident, 0)"),
                col("delivery_death_temp_resident", "COALESCE(d.delivery_death_temp_resident, 0)"),
                col("pnc_death_permanent_resident", "COALESCE(d.pnc_death_permanent_resident, 0)"),
                col("pnc_death_temp_resident", "COALESCE(d.pnc_death_temp_resident, 0)"),
            ],
            group_by: &[],
        },
        level_attributes: &[],
        dimensions: &[],
        blanked: &[],
        measures: &[
            max("state_is_test"),
            max("district_is_test"),
            max("block_is_test"),
            max("supervisor_is_test"),
            max("awc_is_test"),
            sum("visitor_icds_sup"),
            sum("visitor_anm"),
            sum("visitor_health_sup"),
            sum("visitor_cdpo"),
            sum("visitor_med_officer"),
            sum("visitor_dpo"),
            sum("visitor_officer_state"),
            sum("visitor_officer_central"),
            sum("vhnd_done_when_planned"),
            sum("vhnd_with_aww_present"),
            sum("vhnd_with_icds_sup"),
            sum("vhnd_with_asha_present"),
            sum("vhnd_with_anm_mpw"),
            sum("vhnd_with_health_edu_org"),
            sum("vhnd_with_display_tools"),
            sum("vhnd_with_thr_distr"),
            sum("vhnd_with_child_immu"),
            sum("vhnd_with_vit_a_given"),
            sum("vhnd_with_anc_today"),
            sum("vhnd_with_local_leader"),
            sum("vhnd_with_due_list_prep_immunization"),
            sum("vhnd_with_due_list_prep_vita_a"),
            sum("vhnd_with_due_list_prep_antenatal_checkup"),
            sum("mother_death_permanent_resident"),
            sum("mother_death_temp_resident"),
            sum("pregnancy_death_permanent_resident"),
            sum("pregnancy_death_temp_resident"),
            sum("delivery_death_permanent_resident"),
            sum("delivery_death_temp_resident"),
            sum("pnc_death_permanent_resident"),
            sum("pnc_death_temp_resident"),
        ],
    }),
    indexes: &[
        index("level_state", &["aggregation_level", "state_id"]),
        index("awc", &["awc_id"]),
    ],
    validations: &[Validation::NotNull("awc_id")],
};
