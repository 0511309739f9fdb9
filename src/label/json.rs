//! JSON dump of a full label, one object per phoneme.

use serde::Serialize;

use super::{ContextGroup, FullLabel, Oneline};

#[derive(Debug, Serialize)]
struct JsonLabels {
    labels: Vec<JsonLine>,
}

#[derive(Debug, Serialize)]
struct JsonLine {
    time: [i64; 2],
    p: Vec<String>,
    a: Vec<String>,
    b: Vec<String>,
    c: Vec<String>,
    d: Vec<String>,
    e: Vec<String>,
    f: Vec<String>,
    g: Vec<String>,
    h: Vec<String>,
    i: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    j: Option<Vec<String>>,
}

fn slot_strings(group: &ContextGroup) -> Vec<String> {
    group.slots().iter().map(ToString::to_string).collect()
}

impl From<&Oneline> for JsonLine {
    fn from(line: &Oneline) -> Self {
        let c = &line.contexts;
        Self {
            time: [line.start, line.end],
            p: slot_strings(&c.p),
            a: slot_strings(&c.a),
            b: slot_strings(&c.b),
            c: slot_strings(&c.c),
            d: slot_strings(&c.d),
            e: slot_strings(&c.e),
            f: slot_strings(&c.f),
            g: slot_strings(&c.g),
            h: slot_strings(&c.h),
            i: slot_strings(&c.i),
            j: c.j.as_ref().map(slot_strings),
        }
    }
}

impl FullLabel {
    /// Pretty-printed `{"labels": [{"time": [start, end], "p": [...], ...}]}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let doc = JsonLabels {
            labels: self.iter().map(JsonLine::from).collect(),
        };
        serde_json::to_string_pretty(&doc)
    }
}
