//! Data-quality comparison between CRM contacts and their vendor counterparts.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::filter::SOURCE_VENDOR;
use crate::model::{Contact, Population};
use crate::normalize::NameKey;
use crate::score::{score, ContactScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Winner {
    #[serde(rename = "IDI")]
    Vendor,
    #[serde(rename = "Airtable")]
    Crm,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AgeDifference {
    Years(u32),
    Note(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Differences {
    pub name: String,
    pub age_difference: AgeDifference,
    pub same_deceased: bool,
    pub same_bankruptcy: bool,
    pub airtable_relation_to_owner: Option<String>,
    pub idi_relation_to_owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub name: String,
    pub airtable_score: ContactScore,
    pub idi_score: ContactScore,
    /// Vendor score minus CRM score.
    pub score_difference: i64,
    pub winner: Winner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreRange {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub total_comparisons: usize,
    pub average_airtable: f64,
    pub average_idi: f64,
    pub airtable_range: ScoreRange,
    pub idi_range: ScoreRange,
    pub winners: HashMap<Winner, usize>,
    pub winner_percentages: HashMap<Winner, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    /// `None` when nothing could be compared.
    pub summary: Option<ComparisonSummary>,
    pub detailed_comparisons: Vec<Comparison>,
    pub differences_for_manual_review: Vec<Differences>,
}

/// Compare every traced CRM contact in `filtered` with the first vendor
/// contact sharing its name. CRM contacts are scored against `filtered`,
/// vendor contacts against `vendor`.
pub fn compare(filtered: &[Contact], vendor: &[Contact]) -> ComparisonReport {
    let mut vendor_by_key: HashMap<NameKey, &Contact> = HashMap::new();
    for contact in vendor {
        let key = contact.name_key();
        if !key.is_blank() {
            vendor_by_key.entry(key).or_insert(contact);
        }
    }
    let filtered_population = Population::new(filtered);
    let vendor_population = Population::new(vendor);

    let mut comparisons = Vec::new();
    let mut differences = Vec::new();

    for contact in filtered {
        if !contact.is_traced() || contact.source.as_deref() == Some(SOURCE_VENDOR) {
            continue;
        }
        let Some(counterpart) = vendor_by_key.get(&contact.name_key()) else {
            continue;
        };

        let crm_score = score(contact, &filtered_population);
        let vendor_score = score(counterpart, &vendor_population);
        let diff = vendor_score.score as i64 - crm_score.score as i64;
        let winner = match diff {
            d if d > 0 => Winner::Vendor,
            d if d < 0 => Winner::Crm,
            _ => Winner::Tie,
        };

        comparisons.push(Comparison {
            name: contact.display_name(),
            airtable_score: crm_score,
            idi_score: vendor_score,
            score_difference: diff,
            winner,
        });
        differences.push(track_differences(contact, counterpart));
    }

    let summary = summarize(&comparisons);
    info!(compared = comparisons.len(), "comparison finished");
    ComparisonReport {
        summary,
        detailed_comparisons: comparisons,
        differences_for_manual_review: differences,
    }
}

fn track_differences(crm: &Contact, vendor: &Contact) -> Differences {
    let age_difference = match (crm.age, vendor.age) {
        (Some(a), Some(b)) => AgeDifference::Years(a.abs_diff(b)),
        (Some(a), None) => AgeDifference::Note(format!("Airtable has {a}, IDI has None")),
        (None, Some(b)) => AgeDifference::Note(format!("IDI has {b}, Airtable has None")),
        (None, None) => AgeDifference::Note("Both have None".into()),
    };

    Differences {
        name: crm.display_name(),
        age_difference,
        same_deceased: crm.deceased == vendor.deceased,
        same_bankruptcy: crm.bankruptcy == vendor.bankruptcy,
        airtable_relation_to_owner: crm.relation_to_owner.clone(),
        idi_relation_to_owner: vendor.relation_to_owner.clone(),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn summarize(comparisons: &[Comparison]) -> Option<ComparisonSummary> {
    if comparisons.is_empty() {
        return None;
    }
    let total = comparisons.len();
    let crm: Vec<usize> = comparisons.iter().map(|c| c.airtable_score.score).collect();
    let vendor: Vec<usize> = comparisons.iter().map(|c| c.idi_score.score).collect();

    let range = |scores: &[usize]| ScoreRange {
        min: scores.iter().copied().min().unwrap_or(0),
        max: scores.iter().copied().max().unwrap_or(0),
    };
    let average = |scores: &[usize]| round_to(scores.iter().sum::<usize>() as f64 / total as f64, 2);

    let mut winners: HashMap<Winner, usize> =
        [Winner::Vendor, Winner::Crm, Winner::Tie].into_iter().map(|w| (w, 0)).collect();
    for c in comparisons {
        *winners.entry(c.winner).or_default() += 1;
    }
    let winner_percentages = winners
        .iter()
        .map(|(w, n)| (*w, round_to(*n as f64 * 100.0 / total as f64, 1)))
        .collect();

    Some(ComparisonSummary {
        total_comparisons: total,
        average_airtable: average(&crm),
        average_idi: average(&vendor),
        airtable_range: range(&crm),
        idi_range: range(&vendor),
        winners,
        winner_percentages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, ContactId};
    use serde_json::Value;

    fn person(id: u64, first: &str, age: Option<u32>) -> Contact {
        Contact {
            id: ContactId(id),
            first_name: Some(first.into()),
            last_name: Some("Harris".into()),
            age,
            ..Default::default()
        }
    }

    fn traced_crm(mut c: Contact) -> Contact {
        c.extra.insert("Traced".into(), Value::Bool(true));
        c.source = Some("Airtable".into());
        c
    }

    #[test]
    fn compares_traced_crm_contacts_only() {
        let mut vendor_walter = person(1, "Walter", Some(71));
        vendor_walter.addresses = vec![Address::default()];
        let vendor = vec![vendor_walter, person(2, "Ruth", None)];

        let filtered = vec![
            traced_crm(person(10, "walter", Some(70))),
            person(11, "Ruth", Some(68)), // not traced
            traced_crm(person(12, "Ann", None)), // no vendor match
        ];

        let report = compare(&filtered, &vendor);
        assert_eq!(report.detailed_comparisons.len(), 1);
        let c = &report.detailed_comparisons[0];
        assert_eq!(c.airtable_score.score, 1);
        assert_eq!(c.idi_score.score, 2);
        assert_eq!(c.score_difference, 1);
        assert_eq!(c.winner, Winner::Vendor);
        assert_eq!(
            report.differences_for_manual_review[0].age_difference,
            AgeDifference::Years(1)
        );

        let summary = report.summary.unwrap();
        assert_eq!(summary.total_comparisons, 1);
        assert_eq!(summary.winners[&Winner::Vendor], 1);
        assert_eq!(summary.winners[&Winner::Tie], 0);
        assert_eq!(summary.winner_percentages[&Winner::Vendor], 100.0);
    }

    #[test]
    fn averages_round_to_two_places() {
        let mk = |crm: usize, idi: usize| Comparison {
            name: String::new(),
            airtable_score: ContactScore {
                score: crm,
                details: vec![],
                breakdown: Default::default(),
            },
            idi_score: ContactScore {
                score: idi,
                details: vec![],
                breakdown: Default::default(),
            },
            score_difference: idi as i64 - crm as i64,
            winner: Winner::Tie,
        };
        let summary = summarize(&[mk(1, 0), mk(0, 0), mk(0, 0)]).unwrap();
        assert_eq!(summary.average_airtable, 0.33);
        assert_eq!(summary.winner_percentages[&Winner::Tie], 100.0);
        assert_eq!(summary.airtable_range, ScoreRange { min: 0, max: 1 });
    }

    #[test]
    fn empty_comparison_has_no_summary() {
        assert!(compare(&[], &[]).summary.is_none());
    }
}
