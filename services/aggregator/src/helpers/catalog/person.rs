//! Person cases: migration and service registration status, and the per-AWC
//! person counts built from them.

use crate::helpers::descriptor::{
    col, index, HelperDescriptor, Join, JoinKind, LatestValuesSpec, QueryShape, Scope, SelectSpec,
    TableRef, Validation,
};

use super::{AVAILING_SERVICE_FORMS, MIGRATION_FORMS, PERSON_CASES};

/// Latest migration status per person.
pub static MIGRATION: HelperDescriptor = HelperDescriptor {
    key: "migration-forms",
    target: "icds_dashboard_migration_forms",
    scope: Scope::PerState,
    sources: &[MIGRATION_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 12,
    scratch: &[],
    query: QueryShape::LatestValues(LatestValuesSpec {
        source: "static-migration_form",
        key: "person_case_id",
        key_as: "person_case_id",
        carry: &["state_id", "supervisor_id"],
        time_column: "timeend",
        latest_as: "latest_time_end_processed",
        values: &["is_migrated", "migration_date"],
    }),
    indexes: &[index("person", &["person_case_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};

/// Latest service registration status per person.
pub static AVAILING_SERVICES: HelperDescriptor = HelperDescriptor {
    key: "availing-service-forms",
    target: "icds_dashboard_availing_service_forms",
    scope: Scope::PerState,
    sources: &[AVAILING_SERVICE_FORMS],
    depends_on: &[],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 12,
    scratch: &[],
    query: QueryShape::LatestValues(LatestValuesSpec {
        source: "static-availing_service_form",
        key: "person_case_id",
        key_as: "person_case_id",
        carry: &["state_id", "supervisor_id"],
        time_column: "timeend",
        latest_as: "latest_time_end_processed",
        values: &["is_registered", "registration_date"],
    }),
    indexes: &[index("person", &["person_case_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};

/// Joins a person case (alias `ucr`) to its migration (`mig`) and registration
/// (`av`) status for the month.
pub(super) const STATUS_JOINS: [Join; 2] = [
    Join {
        kind: JoinKind::Left,
        table: TableRef::Fact("icds_dashboard_migration_forms"),
        alias: "mig",
        on: "mig.month = :month_start AND mig.supervisor_id = ucr.supervisor_id AND mig.person_case_id = ucr.doc_id",
    },
    Join {
        kind: JoinKind::Left,
        table: TableRef::Fact("icds_dashboard_availing_service_forms"),
        alias: "av",
        on: "av.month = :month_start AND av.supervisor_id = ucr.supervisor_id AND av.person_case_id = ucr.doc_id",
    },
];

/// Not migrated out, or migrated only after the month started.
pub(super) const UNMIGRATED: &str =
    "(mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start)";

/// Open at some point during the month.
pub(super) const OPEN_IN_MONTH: [&str; 2] = [
    "ucr.opened_on < :next_month_start",
    "(ucr.closed_on IS NULL OR ucr.closed_on >= :month_start)",
];

const SEEKING_SERVICES: &str = "SUM(CASE WHEN (av.is_registered IS DISTINCT FROM 0 OR av.registration_date::date >= :month_start) AND (mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start) THEN 1 ELSE 0 END)";

/// Person counts per AWC, with adolescent girls and referrals by problem.
pub static AGG_PERSON_CASES: HelperDescriptor = HelperDescriptor {
    key: "agg-person-cases",
    target: "agg_person_cases",
    scope: Scope::Global,
    sources: &[PERSON_CASES],
    depends_on: &["migration-forms", "availing-service-forms"],
    distribution_column: "supervisor_id",
    state_column: "state_id",
    lookback_months: 0,
    scratch: &[],
    query: QueryShape::Select(SelectSpec {
        from: TableRef::Source("static-person_cases_v3"),
        alias: "ucr",
        joins: &STATUS_JOINS,
        filters: &OPEN_IN_MONTH,
        columns: &[
            col("state_id", "ucr.state_id"),
            col("supervisor_id", "ucr.supervisor_id"),
            col("awc_id", "ucr.awc_id"),
            col("month", ":month_start"),
            col("cases_person", SEEKING_SERVICES),
            col("cases_person_all", "count(*)"),
            col(
                "cases_person_adolescent_girls_11_14",
                "SUM(CASE WHEN ucr.sex = 'F' AND ucr.dob < :next_month_start::date - INTERVAL '11 years' AND ucr.dob >= :month_start::date - INTERVAL '14 years' AND (av.is_registered IS DISTINCT FROM 0 OR av.registration_date::date >= :month_start) AND (mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start) THEN 1 ELSE 0 END)",
            ),
            col(
                "cases_person_adolescent_girls_11_14_all",
                "SUM(CASE WHEN ucr.sex = 'F' AND ucr.dob < :next_month_start::date - INTERVAL '11 years' AND ucr.dob >= :month_start::date - INTERVAL '14 years' THEN 1 ELSE 0 END)",
            ),
            col(
                "cases_person_adolescent_girls_11_14_all_v2",
                "SUM(CASE WHEN ucr.sex = 'F' AND ucr.dob < :next_month_start::date - INTERVAL '11 years' AND ucr.dob >= :month_start::date - INTERVAL '14 years' AND (mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start) THEN 1 ELSE 0 END)",
            ),
            col(
                "cases_person_adolescent_girls_15_18",
                "SUM(CASE WHEN ucr.sex = 'F' AND ucr.dob < :next_month_start::date - INTERVAL '15 years' AND ucr.dob >= :month_start::date - INTERVAL '18 years' AND (av.is_registered IS DISTINCT FROM 0 OR av.registration_date::date >= :month_start) AND (mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start) THEN 1 ELSE 0 END)",
            ),
            col(
                "cases_person_adolescent_girls_15_18_all",
                "SUM(CASE WHEN ucr.sex = 'F' AND ucr.dob < :next_month_start::date - INTERVAL '15 years' AND ucr.dob >= :month_start::date - INTERVAL '18 years' AND (mig.is_migrated IS DISTINCT FROM 1 OR mig.migration_date::date >= :month_start) THEN 1 ELSE 0 END)",
            ),
            col(
                "cases_person_referred",
                "SUM(CASE WHEN ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)",
            ),
            col("total_premature_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%premature%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_premature_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%premature%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_sepsis_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%sepsis%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_sepsis_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%sepsis%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_diarrhoea_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%diarrhoea%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_diarrhoea_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%diarrhoea%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_pneumonia_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%pneumonia%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_pneumonia_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%pneumonia%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_fever_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%fever_child%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_fever_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%fever_child%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_severely_underweight_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%severely_underweight%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_severely_underweight_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%severely_underweight%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_other_child_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%other_child%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_other_child_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%other_child%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_bleeding_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%bleeding%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_bleeding_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%bleeding%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_convulsions_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%convulsions%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_convulsions_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%convulsions%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_prolonged_labor_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%prolonged_labor%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_prolonged_labor_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%prolonged_labor%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_abortion_complications_referrals", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%abortion_complications%' AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_abortion_complications_reached_facility", "SUM(CASE WHEN ucr.referral_health_problem LIKE '%abortion_complications%' AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_fever_discharge_referrals", "SUM(CASE WHEN (ucr.referral_health_problem LIKE '%fever%' OR ucr.referral_health_problem LIKE '%offensive_discharge%') AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_fever_discharge_reached_facility", "SUM(CASE WHEN (ucr.referral_health_problem LIKE '%fever%' OR ucr.referral_health_problem LIKE '%offensive_discharge%') AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_other_referrals", "SUM(CASE WHEN (ucr.referral_health_problem LIKE '%swelling%' OR ucr.referral_health_problem LIKE '%blurred_vision%' OR ucr.referral_health_problem LIKE '%other%') AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
            col("total_other_reached_facility", "SUM(CASE WHEN (ucr.referral_health_problem LIKE '%swelling%' OR ucr.referral_health_problem LIKE '%blurred_vision%' OR ucr.referral_health_problem LIKE '%other%') AND ucr.referral_reached_facility = 1 AND ucr.last_referral_date >= :month_start AND ucr.last_referral_date < :next_month_start THEN 1 ELSE 0 END)"),
        ],
        group_by: &["ucr.state_id", "ucr.supervisor_id", "ucr.awc_id"],
    }),
    indexes: &[index("awc", &["awc_id"])],
    validations: &[Validation::NotNull("supervisor_id")],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adolescent_columns_count_girls_only() {
        let QueryShape::Select(spec) = &AGG_PERSON_CASES.query else {
            panic!("expected a select");
        };
        let adolescents: Vec<_> = spec
            .columns
            .iter()
            .filter(|c| c.name.starts_with("cases_person_adolescent_girls"))
            .collect();
        assert_eq!(adolescents.len(), 5);
        for column in adolescents {
            assert!(column.expr.contains("ucr.sex = 'F'"), "{}", column.name);
        }
    }

    #[test]
    fn test_every_referral_problem_has_both_columns() {
        let QueryShape::Select(spec) = &AGG_PERSON_CASES.query else {
            panic!("expected a select");
        };
        let referrals: Vec<_> = spec
            .columns
            .iter()
            .filter_map(|c| c.name.strip_suffix("_referrals"))
            .collect();
        assert_eq!(referrals.len(), 13);
        for problem in referrals {
            let reached = format!("{problem}_reached_facility");
            let column = spec.columns.iter().find(|c| c.name == reached).unwrap();
            assert!(column.expr.contains("ucr.referral_reached_facility = 1"));
        }
    }
}
