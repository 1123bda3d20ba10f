//! Query message construction for `qry`.

use crate::core::serdering::{sadify, Serder};
use crate::core::{Ilks, Kinds, VERSION};
use crate::errors::KeriResult;
use serde_json::{json, Map, Value};

/// Builder for query messages asking a responder for key event material.
pub struct QueryBuilder {
    route: String,
    query: Map<String, Value>,
    stamp: Option<String>,
    kind: Kinds,
}

impl QueryBuilder {
    pub fn new(route: &str) -> Self {
        QueryBuilder {
            route: route.to_string(),
            query: Map::new(),
            stamp: None,
            kind: Kinds::Json,
        }
    }

    /// Adds a query argument such as the identifier prefix `i`.
    pub fn with_arg(mut self, label: &str, value: Value) -> Self {
        self.query.insert(label.to_string(), value);
        self
    }

    /// ISO-8601 datetime stamp; defaults to the zero epoch placeholder left
    /// to the caller for reproducible queries.
    pub fn with_stamp(mut self, stamp: String) -> Self {
        self.stamp = Some(stamp);
        self
    }

    pub fn with_kind(mut self, kind: Kinds) -> Self {
        self.kind = kind;
        self
    }

    pub fn build(self) -> KeriResult<Serder> {
        let vs = crate::core::versify("KERI", &VERSION, self.kind, 0)?;
        let stamp = match self.stamp {
            Some(stamp) => stamp,
            None => crate::cesr::dater::Dater::now()
                .map(|d| d.dts())
                .unwrap_or_default(),
        };
        let sad = sadify(vec![
            ("v", json!(vs)),
            ("t", json!(Ilks::QRY)),
            ("d", json!("")),
            ("dt", json!(stamp)),
            ("r", json!(self.route)),
            ("rr", json!("")),
            ("q", Value::Object(self.query)),
        ]);
        Serder::makify(sad, self.kind, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query() {
        let serder = QueryBuilder::new("logs")
            .with_arg("i", json!("DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH"))
            .with_stamp("2021-01-01T00:00:00.000000+00:00".to_string())
            .build()
            .unwrap();
        let ked = serder.ked();
        assert_eq!(ked["t"].as_str().unwrap(), Ilks::QRY);
        assert_eq!(ked["r"].as_str().unwrap(), "logs");
        assert_eq!(
            ked["q"]["i"].as_str().unwrap(),
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH"
        );
        // qry is saidified over its own body
        assert!(Serder::from_raw(serder.raw()).is_ok());
    }
}
