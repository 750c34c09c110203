//! GraphQL request construction.
//!
//! Payload records are converted into [`InputValue`] trees and rendered as
//! GraphQL input literals. String values always pass through JSON string
//! escaping, which is also a valid GraphQL string literal, so record text can
//! never leave its value position. Enum values are restricted to `'static`
//! tokens defined in this crate.

use crate::{Stage, StageKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Int(i64),
    String(String),
    /// Bare enum token, e.g. `COMPLETED`.
    Enum(&'static str),
    List(Vec<InputValue>),
    /// Ordered object fields; order is kept so rendering is byte-stable.
    Object(Vec<(&'static str, InputValue)>),
}

impl InputValue {
    pub fn object() -> ObjectBuilder {
        ObjectBuilder { fields: Vec::new() }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    pub fn render_into(&self, out: &mut String) {
        match self {
            InputValue::Int(v) => {
                let _ = write!(out, "{v}");
            }
            InputValue::String(s) => {
                out.push_str(&serde_json::Value::from(s.as_str()).to_string());
            }
            InputValue::Enum(token) => out.push_str(token),
            InputValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render_into(out);
                }
                out.push(']');
            }
            InputValue::Object(fields) => {
                out.push_str("{ ");
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    value.render_into(out);
                }
                out.push_str(" }");
            }
        }
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Int(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::String(v.to_string())
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        InputValue::String(v)
    }
}

pub struct ObjectBuilder {
    fields: Vec<(&'static str, InputValue)>,
}

impl ObjectBuilder {
    pub fn field(mut self, name: &'static str, value: impl Into<InputValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn build(self) -> InputValue {
        InputValue::Object(self.fields)
    }
}

/// A payload record that can be embedded in a mutation's `items` list.
pub trait ToInput {
    fn to_input(&self) -> InputValue;
}

/// JSON body posted to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
}

impl GraphqlRequest {
    pub fn body(&self) -> String {
        serde_json::json!({ "query": self.query }).to_string()
    }

    /// Hex SHA-256 of the request body; equal fingerprints mean byte-identical payloads.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.body().as_bytes());
        format!("{digest:x}")
    }
}

/// Selection set requested for a stage's bulk result.
pub fn selection(stage: Stage) -> String {
    let mut sel = format!(
        "success totalRequested {} totalFailed errorMessage",
        stage.count_field()
    );
    if let (StageKind::Create, Some(id_field)) = (stage.kind(), stage.id_field()) {
        let _ = write!(sel, " insertedItems {{ {id_field} }}");
    }
    sel
}

/// Render one batched mutation carrying every item for the stage.
pub fn bulk_mutation<T: ToInput>(stage: Stage, items: &[T]) -> GraphqlRequest {
    let items = InputValue::List(items.iter().map(ToInput::to_input).collect());
    let input = InputValue::object().field("items", items).build();

    let mut query = String::with_capacity(128);
    let _ = write!(query, "mutation {{ {}(input: ", stage.operation());
    input.render_into(&mut query);
    let _ = write!(query, ") {{ {} }} }}", selection(stage));

    GraphqlRequest { query }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note(&'static str);

    impl ToInput for Note {
        fn to_input(&self) -> InputValue {
            InputValue::object()
                .field("logId", 7_i64)
                .field("logState", InputValue::Enum("FAILED"))
                .field("text", self.0)
                .build()
        }
    }

    #[test]
    fn renders_object_literal_with_bare_enum() {
        let v = Note("plain").to_input();
        assert_eq!(
            v.render(),
            r#"{ logId: 7, logState: FAILED, text: "plain" }"#
        );
    }

    #[test]
    fn escapes_string_values() {
        let v = InputValue::from("a\"b\\c\n}) { __typename");
        assert_eq!(v.render(), r#""a\"b\\c\n}) { __typename""#);
    }

    #[test]
    fn create_selection_includes_identifier_field() {
        assert_eq!(
            selection(Stage::HeaderCreate),
            "success totalRequested totalInserted totalFailed errorMessage insertedItems { logId }"
        );
        assert_eq!(
            selection(Stage::MicroCreate),
            "success totalRequested totalInserted totalFailed errorMessage insertedItems { logMicroserviceId }"
        );
        assert_eq!(
            selection(Stage::ContentCreate),
            "success totalRequested totalInserted totalFailed errorMessage"
        );
        assert_eq!(
            selection(Stage::MicroUpdate),
            "success totalRequested totalUpdated totalFailed errorMessage"
        );
    }

    #[test]
    fn bulk_mutation_shape() {
        let req = bulk_mutation(Stage::HeaderUpdate, &[Note("x"), Note("y")]);
        assert_eq!(
            req.query,
            "mutation { bulkUpdateLogServicesHeader(input: { items: [\
             { logId: 7, logState: FAILED, text: \"x\" }, \
             { logId: 7, logState: FAILED, text: \"y\" }] }) \
             { success totalRequested totalUpdated totalFailed errorMessage } }"
        );

        let body: serde_json::Value = serde_json::from_str(&req.body()).unwrap();
        assert_eq!(body["query"].as_str(), Some(req.query.as_str()));
    }

    #[test]
    fn empty_item_list_renders() {
        let req = bulk_mutation::<Note>(Stage::ContentUpdate, &[]);
        assert!(req.query.contains("(input: { items: [] })"));
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = bulk_mutation(Stage::HeaderUpdate, &[Note("x")]);
        let b = bulk_mutation(Stage::HeaderUpdate, &[Note("x")]);
        let c = bulk_mutation(Stage::HeaderUpdate, &[Note("z")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
