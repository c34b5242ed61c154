// ai
//! 📊 Reports: what happened to each object, in numbers a human can read at 3am.
//!
//! The lambda returns an [`InvocationReport`] as its JSON response. The CLI renders it as
//! a comfy table, with a totals row at the bottom for the people who only read the last line.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use crate::common::ObjectRef;

/// 🚦 The verdict for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// ✅ Every record became a document and every document landed.
    Ok,
    /// ⚠️ Some records or documents were dead-lettered. The rest made it.
    Partial,
    /// 💀 The object could not be fetched, parsed or indexed at all.
    Failed,
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// 📄 One object's journey.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObjectOutcome {
    pub object: ObjectRef,
    pub status: ObjectStatus,
    pub records_seen: usize,
    pub normalized: usize,
    pub indexed: usize,
    pub normalize_failures: usize,
    pub dead_lettered: usize,
    pub errors: Vec<String>,
}

impl ObjectOutcome {
    pub fn new(object: ObjectRef) -> Self {
        Self {
            object,
            status: ObjectStatus::Ok,
            records_seen: 0,
            normalized: 0,
            indexed: 0,
            normalize_failures: 0,
            dead_lettered: 0,
            errors: Vec::new(),
        }
    }

    /// 💀 Marks the object failed. Sticky: nothing downgrades it afterwards.
    pub fn fail(&mut self, message: String) {
        self.status = ObjectStatus::Failed;
        self.errors.push(message);
    }

    /// ⚠️ Records a casualty without failing the object.
    pub fn wound(&mut self, message: String) {
        if self.status == ObjectStatus::Ok {
            self.status = ObjectStatus::Partial;
        }
        self.errors.push(message);
    }
}

/// 📊 Every object of one invocation.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InvocationReport {
    pub objects: Vec<ObjectOutcome>,
}

/// ➕ Column sums across all objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub objects: usize,
    pub failed_objects: usize,
    pub records_seen: usize,
    pub normalized: usize,
    pub indexed: usize,
    pub normalize_failures: usize,
    pub dead_lettered: usize,
}

impl InvocationReport {
    pub fn totals(&self) -> Totals {
        self.objects.iter().fold(
            Totals {
                objects: self.objects.len(),
                ..Totals::default()
            },
            |mut acc, outcome| {
                acc.failed_objects += usize::from(outcome.status == ObjectStatus::Failed);
                acc.records_seen += outcome.records_seen;
                acc.normalized += outcome.normalized;
                acc.indexed += outcome.indexed;
                acc.normalize_failures += outcome.normalize_failures;
                acc.dead_lettered += outcome.dead_lettered;
                acc
            },
        )
    }

    pub fn has_failures(&self) -> bool {
        self.objects.iter().any(|o| o.status == ObjectStatus::Failed)
    }

    /// 🍽️ The comfy table. One row per object, one row of totals.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            "object", "status", "records", "normalized", "indexed", "norm. failures", "dead letters",
        ]);

        let number = |n: usize| Cell::new(n).set_alignment(CellAlignment::Right);
        for outcome in &self.objects {
            table.add_row(vec![
                Cell::new(&outcome.object),
                Cell::new(outcome.status),
                number(outcome.records_seen),
                number(outcome.normalized),
                number(outcome.indexed),
                number(outcome.normalize_failures),
                number(outcome.dead_lettered),
            ]);
        }

        let totals = self.totals();
        table.add_row(vec![
            Cell::new(format!("total ({} objects)", totals.objects)),
            Cell::new(format!("{} failed", totals.failed_objects)),
            number(totals.records_seen),
            number(totals.normalized),
            number(totals.indexed),
            number(totals.normalize_failures),
            number(totals.dead_lettered),
        ]);
        table.to_string()
    }
}
