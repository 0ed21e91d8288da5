//! Every fact table the pipeline builds, in declaration order.
//!
//! Declaration order doubles as the tie-break for planning: location
//! snapshot, then form aggregates, then person status and counts, then
//! per-beneficiary monthly tables, then location rollups and the AWC reports.

mod forms;
mod location;
mod monthly;
mod person;
mod rollups;

use super::descriptor::{HelperDescriptor, SourceRef};

pub const AWC_LOCATION: SourceRef = SourceRef {
    id: "static-awc_location",
    time_column: None,
    state_column: Some("state_id"),
    allow_empty: false,
};

pub const DAILY_ATTENDANCE: SourceRef = SourceRef {
    id: "static-daily_attendance",
    time_column: Some("pse_date"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const THR_FORMS: SourceRef = SourceRef {
    id: "static-dashboard_thr_forms",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const SAM_MAM_VISITS: SourceRef = SourceRef {
    id: "static-sam_mam_visit",
    time_column: None,
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const GROWTH_MONITORING_FORMS: SourceRef = SourceRef {
    id: "static-dashboard_growth_monitoring_forms",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const INFRASTRUCTURE_FORMS: SourceRef = SourceRef {
    id: "static-infrastructure_form_v2",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const DAILY_FEEDING_FORMS: SourceRef = SourceRef {
    id: "static-daily_feeding_forms",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const CHILD_HEALTH_CASES: SourceRef = SourceRef {
    id: "static-child_health_cases",
    time_column: None,
    state_column: Some("state_id"),
    allow_empty: false,
};

pub const CCS_RECORD_CASES: SourceRef = SourceRef {
    id: "static-ccs_record_cases",
    time_column: None,
    state_column: Some("state_id"),
    allow_empty: false,
};

pub const PERSON_CASES: SourceRef = SourceRef {
    id: "static-person_cases_v3",
    time_column: None,
    state_column: Some("state_id"),
    allow_empty: false,
};

pub const MIGRATION_FORMS: SourceRef = SourceRef {
    id: "static-migration_form",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const AVAILING_SERVICE_FORMS: SourceRef = SourceRef {
    id: "static-availing_service_form",
    time_column: Some("timeend"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const VISITORBOOK_FORMS: SourceRef = SourceRef {
    id: "static-visitorbook_forms",
    time_column: Some("submitted_on"),
    state_column: Some("state_id"),
    allow_empty: true,
};

pub const VHND_FORMS: SourceRef = SourceRef {
    id: "static-vhnd_form",
    time_column: Some("submitted_on"),
    state_column: Some("state_id"),
    allow_empty: true,
};

/// All descriptors, in declaration order.
pub static DESCRIPTORS: [&HelperDescriptor; 18] = [
    &location::AWC_LOCATION_MONTHS,
    &location::DAILY_ATTENDANCE_MONTHLY,
    &forms::THR_CHILD_HEALTH,
    &forms::THR_CCS_RECORD,
    &forms::SAM_MAM,
    &forms::SAM_MAM_PANCHAYAT,
    &forms::GROWTH_MONITORING,
    &forms::INFRASTRUCTURE,
    &forms::DAILY_FEEDING,
    &person::MIGRATION,
    &person::AVAILING_SERVICES,
    &person::AGG_PERSON_CASES,
    &monthly::CHILD_HEALTH_MONTHLY,
    &monthly::CCS_RECORD_MONTHLY,
    &rollups::AGG_CHILD_HEALTH,
    &rollups::AGG_CCS_RECORD,
    &rollups::AGG_AWC,
    &rollups::AGG_MPR_AWC,
];

/// Look up a descriptor by helper key.
pub fn find(key: &str) -> Option<&'static HelperDescriptor> {
    DESCRIPTORS.iter().copied().find(|d| d.key == key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::helpers::descriptor::{QueryShape, Scope, LOCATION_LEVELS};

    #[test]
    fn test_keys_and_targets_are_unique() {
        let keys: HashSet<_> = DESCRIPTORS.iter().map(|d| d.key).collect();
        let targets: HashSet<_> = DESCRIPTORS.iter().map(|d| d.target).collect();
        assert_eq!(keys.len(), DESCRIPTORS.len());
        assert_eq!(targets.len(), DESCRIPTORS.len());
    }

    #[test]
    fn test_every_descriptor_validates() {
        for descriptor in DESCRIPTORS {
            descriptor
                .validate()
                .unwrap_or_else(|e| panic!("{}: {e}", descriptor.key));
        }
    }

    #[test]
    fn test_dependencies_are_declared_earlier() {
        for (i, descriptor) in DESCRIPTORS.iter().enumerate() {
            for dependency in descriptor.depends_on {
                let position = DESCRIPTORS
                    .iter()
                    .position(|d| d.key == *dependency)
                    .unwrap_or_else(|| panic!("{} depends on unknown {dependency}", descriptor.key));
                assert!(position < i, "{} declared before {dependency}", descriptor.key);
            }
        }
    }

    #[test]
    fn test_state_scoped_helpers_filter_their_source_by_state() {
        for descriptor in DESCRIPTORS.iter().filter(|d| d.scope == Scope::PerState) {
            let primary = descriptor.primary_source().unwrap();
            assert!(primary.state_column.is_some(), "{}", descriptor.key);
            assert!(descriptor.scratch.is_empty(), "{}", descriptor.key);
        }
    }

    #[test]
    fn test_rollup_leaves_emit_every_rolled_column() {
        for descriptor in DESCRIPTORS {
            let QueryShape::Rollup(spec) = &descriptor.query else {
                continue;
            };
            let emitted: HashSet<_> = spec.leaf.columns.iter().map(|c| c.name).collect();
            let required = LOCATION_LEVELS
                .iter()
                .copied()
                .chain(["month", "aggregation_level"])
                .chain(spec.level_attributes.iter().map(|a| a.column))
                .chain(spec.dimensions.iter().copied())
                .chain(spec.blanked.iter().copied())
                .chain(spec.measures.iter().map(|m| m.column));
            for column in required {
                assert!(
                    emitted.contains(column),
                    "{} leaf does not emit {column}",
                    descriptor.key
                );
            }
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("agg-awc").map(|d| d.target), Some("agg_awc"));
        assert!(find("agg-bihar").is_none());
    }
}
