//! Per-subject susceptibility aggregation
//!
//! Folds the lab results of a set of cultures into one
//! [`SubjectSusceptibility`] per counterpart of the subject. Scores are
//! blended pairwise as results arrive, so the outcome depends on record order.

use std::collections::HashMap;

use antibug_core::{
    CultureRecord, Label, SubjectAntibiogram, SubjectKind, SubjectRef, SubjectSusceptibility,
};

/// Label frequencies of one counterpart, indexed by label code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelTally([u32; 4]);

impl LabelTally {
    pub fn record(&mut self, label: Label) {
        self.0[label.index()] += 1;
    }

    pub fn count(&self, label: Label) -> u32 {
        self.0[label.index()]
    }

    /// Most frequent label. Ties go to the lowest label code.
    pub fn dominant(&self) -> Label {
        let mut best = Label::ALL[0];
        for label in Label::ALL.into_iter().skip(1) {
            if self.count(label) > self.count(best) {
                best = label;
            }
        }
        best
    }
}

struct Slot {
    entry: SubjectSusceptibility,
    tally: LabelTally,
}

/// Aggregate `records` into the antibiogram of `subject`.
///
/// Only results whose subject-role id (per `kind`) equals `subject.id` are
/// counted. Entries are emitted in the order their counterpart was first seen.
pub fn aggregate(
    records: &[CultureRecord],
    subject: &SubjectRef,
    kind: SubjectKind,
) -> SubjectAntibiogram {
    let mut slots: Vec<Slot> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    let results = records
        .iter()
        .flat_map(|record| record.culture_results.iter())
        .filter(|result| result.subject_id(kind) == subject.id);

    for result in results {
        let (counterpart_id, counterpart_name) = result.counterpart(kind);

        match index.get(counterpart_id).copied() {
            Some(i) => {
                let slot = &mut slots[i];
                slot.entry.isolate_count += 1;
                slot.entry.susceptibility_score =
                    (slot.entry.susceptibility_score + result.susceptibility_score) / 2.0;
                slot.tally.record(result.label);
                slot.entry.label = slot.tally.dominant();
            }
            None => {
                let mut tally = LabelTally::default();
                tally.record(result.label);
                index.insert(counterpart_id, slots.len());
                slots.push(Slot {
                    entry: SubjectSusceptibility {
                        name: counterpart_name.to_string(),
                        id: counterpart_id.to_string(),
                        isolate_count: 1,
                        susceptibility_score: result.susceptibility_score,
                        label: result.label,
                    },
                    tally,
                });
            }
        }
    }

    SubjectAntibiogram {
        subject_name: subject.name.clone(),
        subject_id: subject.id.clone(),
        susceptibilities: slots.into_iter().map(|slot| slot.entry).collect(),
    }
}
