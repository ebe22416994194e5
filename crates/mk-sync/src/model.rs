//! Draft and persisted step types.
//!
//! A `DraftStep` exists only client-side; a `PersistedProcedure` mirrors
//! what the server holds and is only ever produced by the CRUD collaborator
//! — the step manager never fabricates ids or step numbers on its own.
//!
//! Precautions arrive from the server either as structured arrays or as a
//! JSON-stringified encoding of the same shape. The object form is
//! canonical; the string form is parsed as a compatibility shim only.

use serde::{Deserialize, Deserializer, Serialize};

/// Server-side identifier of a procedure. Assigned by the CRUD collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureId(pub u64);

/// Server-side identifier of the parent job aid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobAidId(pub u64);

/// An optional safety note attached to one step. The instruction may be
/// blank only transiently while being edited; blank precautions never
/// reach a persistence payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precaution {
    #[serde(default)]
    pub id: Option<u64>,
    pub instruction: String,
}

impl Precaution {
    pub fn blank() -> Self {
        Self {
            id: None,
            instruction: String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.instruction.trim().is_empty()
    }
}

/// A reference image: either already hosted, or raw bytes that still need
/// the upload collaborator before they can be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Hosted(String),
    Embedded(Vec<u8>),
}

impl ImageRef {
    pub fn hosted_url(&self) -> Option<&str> {
        match self {
            ImageRef::Hosted(url) => Some(url),
            ImageRef::Embedded(_) => None,
        }
    }
}

/// One locally drafted step. Exists only until persisted or cancelled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftStep {
    pub instruction: String,
    /// Hosted image URL, when the step already has one (e.g. loaded for
    /// editing). Steps without one receive the save-level flattened image.
    pub image: Option<String>,
    pub description: String,
    pub precautions: Vec<Precaution>,
}

impl DraftStep {
    /// Precautions worth persisting: blank instructions filtered out.
    pub fn effective_precautions(&self) -> Vec<Precaution> {
        self.precautions
            .iter()
            .filter(|p| !p.is_blank())
            .cloned()
            .collect()
    }
}

/// Server-held step, mirrored locally after each successful round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProcedure {
    pub id: ProcedureId,
    /// 1-based, dense, monotonic within a job aid.
    pub step: u32,
    pub title: String,
    pub instruction: String,
    pub image: String,
    #[serde(deserialize_with = "normalize_precautions", default)]
    pub precautions: Vec<Precaution>,
}

/// Payload for a `create` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProcedure {
    pub title: String,
    pub step: u32,
    pub instruction: String,
    pub image: String,
    pub precautions: Vec<Precaution>,
}

/// Payload for an `update` call. The step index is carried through
/// unchanged from the loaded procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureUpdate {
    pub title: String,
    pub step: u32,
    pub instruction: String,
    pub image: String,
    pub precautions: Vec<Precaution>,
}

// ─── Precaution normalization shim ───────────────────────────────────────

/// Accept either the canonical array form or a JSON-stringified encoding
/// of the same array. Unparseable strings degrade to an empty list with a
/// warning rather than failing the whole response.
fn normalize_precautions<'de, D>(deserializer: D) -> Result<Vec<Precaution>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        List(Vec<Precaution>),
        Encoded(String),
    }

    match Option::<Wire>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Wire::List(list)) => Ok(list),
        Some(Wire::Encoded(s)) => match serde_json::from_str(&s) {
            Ok(list) => Ok(list),
            Err(err) => {
                log::warn!("unparseable stringified precautions ({err}); dropping");
                Ok(Vec::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn structured_precautions_pass_through() {
        let json = r#"{
            "id": 7, "step": 1, "title": "t", "instruction": "i", "image": "u",
            "precautions": [{"id": 1, "instruction": "wear gloves"}]
        }"#;
        let p: PersistedProcedure = serde_json::from_str(json).unwrap();
        assert_eq!(p.precautions.len(), 1);
        assert_eq!(p.precautions[0].instruction, "wear gloves");
    }

    #[test]
    fn stringified_precautions_are_normalized() {
        let json = r#"{
            "id": 7, "step": 1, "title": "t", "instruction": "i", "image": "u",
            "precautions": "[{\"instruction\": \"lockout power\"}]"
        }"#;
        let p: PersistedProcedure = serde_json::from_str(json).unwrap();
        assert_eq!(p.precautions.len(), 1);
        assert_eq!(p.precautions[0].instruction, "lockout power");
    }

    #[test]
    fn unparseable_string_degrades_to_empty() {
        let json = r#"{
            "id": 7, "step": 1, "title": "t", "instruction": "i", "image": "u",
            "precautions": "not json"
        }"#;
        let p: PersistedProcedure = serde_json::from_str(json).unwrap();
        assert!(p.precautions.is_empty());
    }

    #[test]
    fn missing_precautions_default_to_empty() {
        let json = r#"{"id": 7, "step": 1, "title": "t", "instruction": "i", "image": "u"}"#;
        let p: PersistedProcedure = serde_json::from_str(json).unwrap();
        assert!(p.precautions.is_empty());
    }

    #[test]
    fn blank_precautions_are_filtered() {
        let draft = DraftStep {
            instruction: "tighten bolts".into(),
            precautions: vec![
                Precaution { id: None, instruction: "  ".into() },
                Precaution { id: None, instruction: "torque to 25 Nm".into() },
                Precaution::blank(),
            ],
            ..Default::default()
        };
        let kept = draft.effective_precautions();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].instruction, "torque to 25 Nm");
    }
}
