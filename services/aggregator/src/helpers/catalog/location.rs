use crate::helpers::descriptor::{
    attr, col, index, HelperDescriptor, QueryShape, RollupSpec, Scope, SelectSpec, TableRef,
    Validation,
};

use super::{AWC_LOCATION, DAILY_ATTENDANCE};

/// Monthly snapshot of the location hierarchy, one row per AWC plus one per
/// supervisor, block, district and state.
pub static AWC_LOCATION_MONTHS: HelperDescriptor = HelperDescriptor {
    key: "awc-location",
    target: "awc_location_months",
    scope: Scope::Global,
    sources: &[AWC_LOCATION],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Rollup(RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Source("static-awc_location"),
            alias: "ucr",
            joins: &[],
            filters: &[],
            columns: &[
                col("state_id", "ucr.state_id"),
                col("district_id", "ucr.district_id"),
                col("block_id", "ucr.block_id"),
                col("supervisor_id", "ucr.supervisor_id"),
                col("awc_id", "ucr.awc_id"),
                col("month", ":month_start"),
                col("aggregation_level", "5"),
                col("state_name", "ucr.state_name"),
                col("state_site_code", "ucr.state_site_code"),
                col("state_is_test", "ucr.state_is_test"),
                col("district_name", "ucr.district_name"),
                col("district_site_code", "ucr.district_site_code"),
                col("district_is_test", "ucr.district_is_test"),
                col("block_name", "ucr.block_name"),
                col("block_site_code", "ucr.block_site_code"),
                col("block_is_test", "ucr.block_is_test"),
                col("supervisor_name", "ucr.supervisor_name"),
                col("supervisor_site_code", "ucr.supervisor_site_code"),
                col("supervisor_is_test", "ucr.supervisor_is_test"),
                col("awc_name", "ucr.awc_name"),
                col("awc_site_code", "ucr.awc_site_code"),
                col("awc_is_test", "ucr.awc_is_test"),
                col("aww_name", "ucr.aww_name"),
                col("contact_phone_number", "ucr.contact_phone_number"),
            ],
            group_by: &[],
        },
        level_attributes: &[
            attr(1, "state_name"),
            attr(1, "state_site_code"),
            attr(1, "state_is_test"),
            attr(2, "district_name"),
            attr(2, "district_site_code"),
            attr(2, "district_is_test"),
            attr(3, "block_name"),
            attr(3, "block_site_code"),
            attr(3, "block_is_test"),
            attr(4, "supervisor_name"),
            attr(4, "supervisor_site_code"),
            attr(4, "supervisor_is_test"),
            attr(5, "awc_name"),
            attr(5, "awc_site_code"),
            attr(5, "awc_is_test"),
            attr(5, "aww_name"),
            attr(5, "contact_phone_number"),
        ],
        dimensions: &[],
        blanked: &[],
        measures: &[],
    }),
    indexes: &[
        index("level_state", &["aggregation_level", "state_id"]),
        index("awc", &["awc_id"]),
    ],
    validations: &[
        Validation::NotNull("state_id"),
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("awc_id"),
    ],
};

/// Days each AWC was open and children attending pre-school education.
pub static DAILY_ATTENDANCE_MONTHLY: HelperDescriptor = HelperDescriptor {
    key: "daily-attendance",
    target: "daily_attendance",
    scope: Scope::Global,
    sources: &[DAILY_ATTENDANCE],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-daily_attendance"),
        alias: "ucr",
        joins: &[],
        filters: &[],
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("awc_id", "ucr.awc_id"),
            col("month", ":month_start"),
            col("awc_days_open", "SUM(COALESCE(ucr.awc_open_count, 0))"),
            col(
                "awc_days_pse_conducted",
                "COUNT(DISTINCT ucr.pse_date) FILTER (WHERE ucr.attended_children > 0)",
            ),
            col("attended_children_sum", "SUM(COALESCE(ucr.attended_children, 0))"),
            col("latest_submission", "MAX(ucr.submitted_on)"),
        ],
        group_by: &["ucr.state_id", "ucr.supervisor_id", "ucr.awc_id"],
    }),
    indexes: &[index("awc", &["awc_id"])],
    validations: &[
        Validation::NotNull("supervisor_id"),
        Validation::NotNull("awc_id"),
        Validation::NonNegative("attended_children"),
    ],
};
