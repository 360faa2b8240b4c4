// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-feature expressions. An expression is either a literal or a node
//! `[operator, operand, operand]`, for example
//! `["+", ["property", "height"], 2]`. Evaluation never fails: anything
//! malformed degrades to `Value::Undefined` or `Value::Null`.

use crate::feature::Feature;
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

pub mod formula;

/// The type an expression result is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Number,
    String,
    /// No coercion, the value is passed through as is.
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map_or(Value::Undefined, Value::Number),
            JsonValue::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_defined(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            _ => true,
        }
    }

    /// The value as a finite number, parsing text if needed.
    pub fn as_f64(&self) -> Option<f64> {
        let number = match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Undefined | Value::Null => return None,
        };
        if number.is_finite() {
            Some(number)
        } else {
            None
        }
    }

    /// The value stringified. Integral numbers print without a fraction.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Undefined | Value::Null => None,
        }
    }

    fn coerce(self, kind: Kind) -> Self {
        match kind {
            Kind::Raw => self,
            Kind::Number => self.as_f64().map_or(Value::Undefined, Value::Number),
            Kind::String => self.to_text().map_or(Value::Undefined, Value::Text),
        }
    }
}

/// Evaluates `expression` for `feature` and coerces the result to `kind`.
/// Unknown operators yield `Value::Null` regardless of `kind`.
pub fn evaluate(kind: Kind, expression: &JsonValue, feature: &Feature) -> Value {
    match expression {
        JsonValue::Null => Value::Undefined,
        JsonValue::String(s) if s.is_empty() => Value::Undefined,
        JsonValue::Array(node) => match evaluate_node(kind, node, feature) {
            Value::Null => Value::Null,
            value => value.coerce(kind),
        },
        literal => Value::from_json(literal).coerce(kind),
    }
}

fn evaluate_node(kind: Kind, node: &[JsonValue], feature: &Feature) -> Value {
    let operator = match node.first().and_then(JsonValue::as_str) {
        Some(operator) => operator,
        None => return Value::Null,
    };
    let operand_kind = match operator {
        "property" | "func" => Kind::Raw,
        _ => kind,
    };
    let operand = |index: usize| {
        node.get(index)
            .map_or(Value::Undefined, |e| evaluate(operand_kind, e, feature))
    };

    match operator {
        "+" | "-" | "*" | "/" => {
            let (a, b) = match (operand(1).as_f64(), operand(2).as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Value::Undefined,
            };
            let result = match operator {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                _ if b == 0. => return Value::Undefined,
                _ => a / b,
            };
            if result.is_finite() {
                Value::Number(result)
            } else {
                Value::Undefined
            }
        }
        "concat" => match (operand(1).to_text(), operand(2).to_text()) {
            (Some(a), Some(b)) => Value::Text(a + &b),
            _ => Value::Undefined,
        },
        "lowercase" => operand(1)
            .to_text()
            .map_or(Value::Undefined, |s| Value::Text(s.to_lowercase())),
        "uppercase" => operand(1)
            .to_text()
            .map_or(Value::Undefined, |s| Value::Text(s.to_uppercase())),
        "property" => match operand(1).to_text() {
            Some(key) => feature
                .property(&key)
                .map_or(Value::Undefined, Value::from_json),
            None => Value::Undefined,
        },
        "func" => match operand(1).to_text() {
            Some(name) => derived_scalar(&name, feature),
            None => Value::Undefined,
        },
        _ => Value::Null,
    }
}

/// `$minZ` and `$maxZ` over every position of the geometry. Missing Z counts as 0.
fn derived_scalar(name: &str, feature: &Feature) -> Value {
    let heights = feature.geometry.positions().map(|p| p.z.unwrap_or(0.));
    let extreme = match name {
        "$minZ" => heights.fold(None, |acc: Option<f64>, z| Some(acc.map_or(z, |m| m.min(z)))),
        "$maxZ" => heights.fold(None, |acc: Option<f64>, z| Some(acc.map_or(z, |m| m.max(z)))),
        _ => return Value::Null,
    };
    extreme.map_or(Value::Undefined, Value::Number)
}

/// An expression as found in configuration files. Besides literals and
/// operator nodes, it accepts `{"formula": "height * 2 + $minZ"}`, which is
/// compiled once into an operator tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    tree: JsonValue,
}

impl Expression {
    pub fn new(value: JsonValue) -> Self {
        let tree = match value.get("formula").and_then(JsonValue::as_str) {
            Some(text) => match formula::compile(text) {
                Ok(tree) => tree,
                Err(err) => {
                    warn!("{}", err);
                    JsonValue::Null
                }
            },
            None => value,
        };
        Expression { tree }
    }

    pub fn tree(&self) -> &JsonValue {
        &self.tree
    }

    pub fn evaluate(&self, kind: Kind, feature: &Feature) -> Value {
        evaluate(kind, &self.tree, feature)
    }

    pub fn number(&self, feature: &Feature) -> Option<f64> {
        self.evaluate(Kind::Number, feature).as_f64()
    }

    pub fn text(&self, feature: &Feature) -> Option<String> {
        self.evaluate(Kind::String, feature).to_text()
    }
}

impl From<JsonValue> for Expression {
    fn from(value: JsonValue) -> Self {
        Expression::new(value)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Expression::new)
    }
}
