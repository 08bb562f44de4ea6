//! Data-completeness scoring.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{Contact, Population};
use crate::normalize::NameKey;

/// Each contributing term of a [`ContactScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub has_age: bool,
    pub deceased: bool,
    pub address_count: usize,
    pub relation_count: usize,
}

impl ScoreBreakdown {
    pub fn total(&self) -> usize {
        usize::from(self.has_age)
            + usize::from(self.deceased)
            + self.address_count
            + self.relation_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactScore {
    pub score: usize,
    pub details: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

/// Score a contact: 1 for a known age, 1 for an explicit deceased flag, one
/// per address, one per distinct related person resolvable in `population`.
pub fn score(contact: &Contact, population: &Population<'_>) -> ContactScore {
    let breakdown = ScoreBreakdown {
        has_age: contact.age.is_some(),
        deceased: contact.deceased == Some(true),
        address_count: contact.addresses.len(),
        relation_count: count_unique_relations(contact, population),
    };

    let mut details = Vec::new();
    if breakdown.has_age {
        details.push("Has age".to_string());
    }
    if breakdown.deceased {
        details.push("Has death info".to_string());
    }
    if breakdown.address_count > 0 {
        details.push(format!("{} addresses", breakdown.address_count));
    }
    if breakdown.relation_count > 0 {
        details.push(format!("{} unique relations", breakdown.relation_count));
    }

    ContactScore {
        score: breakdown.total(),
        details,
        breakdown,
    }
}

/// Distinct people behind `contact.relations`, by name key. Unresolvable IDs,
/// nameless relatives and the contact's own name are not counted.
pub fn count_unique_relations(contact: &Contact, population: &Population<'_>) -> usize {
    let own = contact.name_key();
    contact
        .relations
        .iter()
        .filter_map(|id| population.get(*id))
        .map(Contact::name_key)
        .filter(|key| !key.is_blank() && *key != own)
        .collect::<BTreeSet<NameKey>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, ContactId};

    fn person(id: u64, first: &str, last: &str) -> Contact {
        Contact {
            id: ContactId(id),
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            ..Default::default()
        }
    }

    #[test]
    fn full_score_with_breakdown() {
        let mut subject = person(1, "Walter", "Harris");
        subject.age = Some(30);
        subject.deceased = Some(true);
        subject.addresses = vec![Address::default(), Address::default()];
        subject.relations = vec![ContactId(2)];
        let relative = person(2, "Ruth", "Harris");

        let all = [subject.clone(), relative];
        let population = Population::new(&all);
        let result = score(&subject, &population);

        assert_eq!(result.score, 5);
        assert_eq!(
            result.breakdown,
            ScoreBreakdown {
                has_age: true,
                deceased: true,
                address_count: 2,
                relation_count: 1,
            }
        );
        assert_eq!(result.details.len(), 4);
    }

    #[test]
    fn deceased_false_scores_nothing() {
        let mut subject = person(1, "A", "B");
        subject.deceased = Some(false);
        let population = Population::default();
        assert_eq!(score(&subject, &population).score, 0);
    }

    #[test]
    fn relations_are_counted_by_person_not_id() {
        let mut subject = person(1, "Walter", "Harris");
        // 2 and 3 are the same person, 4 is the subject's own name, 99 is missing.
        subject.relations = vec![ContactId(2), ContactId(3), ContactId(4), ContactId(99)];
        let all = [
            subject.clone(),
            person(2, "Ruth", "Harris"),
            person(3, " ruth ", "HARRIS"),
            person(4, "Walter", "Harris"),
        ];
        let population = Population::new(&all);
        let result = score(&subject, &population);
        assert_eq!(result.breakdown.relation_count, 1);
        assert_eq!(result.score, 1);
    }
}
