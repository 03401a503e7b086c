//! Compartment types and per-resource compartment membership.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The compartments a resource can belong to.
///
/// See: https://build.fhir.org/compartmentdefinition.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompartmentType {
    /// Patient compartment.
    Patient,
    /// Encounter compartment.
    Encounter,
    /// RelatedPerson compartment.
    RelatedPerson,
    /// Practitioner compartment.
    Practitioner,
    /// Device compartment.
    Device,
}

impl CompartmentType {
    /// All compartment types, in index order.
    pub const ALL: [CompartmentType; 5] = [
        CompartmentType::Patient,
        CompartmentType::Encounter,
        CompartmentType::RelatedPerson,
        CompartmentType::Practitioner,
        CompartmentType::Device,
    ];

    /// The resource type that anchors this compartment.
    pub fn resource_type(&self) -> &'static str {
        match self {
            CompartmentType::Patient => "Patient",
            CompartmentType::Encounter => "Encounter",
            CompartmentType::RelatedPerson => "RelatedPerson",
            CompartmentType::Practitioner => "Practitioner",
            CompartmentType::Device => "Device",
        }
    }
}

impl fmt::Display for CompartmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

impl FromStr for CompartmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(CompartmentType::Patient),
            "Encounter" => Ok(CompartmentType::Encounter),
            "RelatedPerson" => Ok(CompartmentType::RelatedPerson),
            "Practitioner" => Ok(CompartmentType::Practitioner),
            "Device" => Ok(CompartmentType::Device),
            _ => Err(format!("unknown compartment type: {}", s)),
        }
    }
}

/// Compartment membership of a single resource.
///
/// A bucket is `None` when the compartment does not apply to the resource
/// type at all, and an empty set when it applies but nothing references an
/// owner. Created once at index time and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompartmentIndices {
    /// Patient ids.
    pub patient: Option<BTreeSet<String>>,
    /// Encounter ids.
    pub encounter: Option<BTreeSet<String>>,
    /// RelatedPerson ids.
    pub related_person: Option<BTreeSet<String>>,
    /// Practitioner ids.
    pub practitioner: Option<BTreeSet<String>>,
    /// Device ids.
    pub device: Option<BTreeSet<String>>,
}

impl CompartmentIndices {
    /// Returns the bucket for a compartment type.
    pub fn get(&self, compartment: CompartmentType) -> Option<&BTreeSet<String>> {
        match compartment {
            CompartmentType::Patient => self.patient.as_ref(),
            CompartmentType::Encounter => self.encounter.as_ref(),
            CompartmentType::RelatedPerson => self.related_person.as_ref(),
            CompartmentType::Practitioner => self.practitioner.as_ref(),
            CompartmentType::Device => self.device.as_ref(),
        }
    }

    pub(crate) fn set(&mut self, compartment: CompartmentType, ids: Option<BTreeSet<String>>) {
        let slot = match compartment {
            CompartmentType::Patient => &mut self.patient,
            CompartmentType::Encounter => &mut self.encounter,
            CompartmentType::RelatedPerson => &mut self.related_person,
            CompartmentType::Practitioner => &mut self.practitioner,
            CompartmentType::Device => &mut self.device,
        };
        *slot = ids;
    }

    /// Returns true if the resource belongs to the given compartment instance.
    pub fn contains(&self, compartment: CompartmentType, id: &str) -> bool {
        self.get(compartment).is_some_and(|ids| ids.contains(id))
    }

    /// Iterates over `(compartment, id)` memberships.
    pub fn memberships(&self) -> impl Iterator<Item = (CompartmentType, &str)> + '_ {
        CompartmentType::ALL.into_iter().flat_map(move |compartment| {
            self.get(compartment)
                .into_iter()
                .flatten()
                .map(move |id| (compartment, id.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compartment_type_round_trip_names() {
        for compartment in CompartmentType::ALL {
            assert_eq!(
                compartment.to_string().parse::<CompartmentType>().unwrap(),
                compartment
            );
        }
        assert!("Organization".parse::<CompartmentType>().is_err());
    }

    #[test]
    fn test_memberships() {
        let mut indices = CompartmentIndices::default();
        indices.set(
            CompartmentType::Patient,
            Some(["p1".to_string(), "p2".to_string()].into_iter().collect()),
        );
        indices.set(CompartmentType::Device, Some(BTreeSet::new()));

        let memberships: Vec<_> = indices.memberships().collect();
        assert_eq!(
            memberships,
            vec![
                (CompartmentType::Patient, "p1"),
                (CompartmentType::Patient, "p2")
            ]
        );
        assert!(indices.contains(CompartmentType::Patient, "p2"));
        assert!(!indices.contains(CompartmentType::Encounter, "p2"));
    }
}
