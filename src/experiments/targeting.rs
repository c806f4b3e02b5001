use serde_json::Value;

use crate::attributes::canonical_f64_string;
use crate::{AttributeValue, Attributes, Error, Result};

/// A boolean predicate tree evaluated against caller-supplied [`Attributes`].
///
/// Built from a JSON predicate document with a single top-level operator, one of
/// `ALL`/`ANY`/`NOT`/`EQ`/`GT`/`GE`/`LT`/`LE`/`NE`/`OVERRIDE` (case-insensitive). Construction
/// validates node shapes; evaluation is pure and immutable, so a tree is safe for unlimited
/// concurrent readers.
///
/// Input keys are expected to be lower-cased by the caller; predicate field names are
/// lower-cased during construction.
#[derive(Debug, Clone)]
pub struct Targeting {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
    Equal(EqualNode),
    Comparison(ComparisonNode),
    Override(bool),
}

/// Field equality against a set of acceptable values, true if any match. Candidates are
/// compared by canonical decimal string so `5` matches `5.0`. An explicit `null` in the
/// acceptable set matches a missing or nil input field.
#[derive(Debug, Clone)]
struct EqualNode {
    field: String,
    accepts_null: bool,
    values: Vec<String>,
}

#[derive(Debug, Clone)]
struct ComparisonNode {
    field: String,
    operator: ComparisonOperator,
    value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonOperator {
    Gt,
    Ge,
    Lt,
    Le,
    Ne,
}

impl Targeting {
    /// Build a predicate tree from a JSON predicate document.
    ///
    /// Fails with [`Error::TargetingNode`] when a recognized operator has the wrong shape and
    /// with [`Error::UnknownTargetingOperator`] when the operator name is outside the known
    /// set.
    pub fn new(document: &Value) -> Result<Targeting> {
        Ok(Targeting {
            root: parse_node(document)?,
        })
    }

    /// An always-true predicate, used when an experiment has no targeting configured.
    pub fn always_true() -> Targeting {
        Targeting {
            root: Node::Override(true),
        }
    }

    pub fn evaluate(&self, inputs: &Attributes) -> bool {
        self.root.evaluate(inputs)
    }
}

fn parse_node(document: &Value) -> Result<Node> {
    let object = document.as_object().ok_or_else(|| {
        Error::TargetingNode(format!("expected a predicate object, got {document}"))
    })?;
    if object.len() != 1 {
        return Err(Error::TargetingNode(format!(
            "expected exactly one operator per node, got {}",
            object.len()
        )));
    }
    let (operator, value) = object
        .iter()
        .next()
        .expect("non-empty object checked above");

    match operator.to_uppercase().as_str() {
        "ALL" => Ok(Node::All(parse_children(operator, value)?)),
        "ANY" => Ok(Node::Any(parse_children(operator, value)?)),
        "NOT" => Ok(Node::Not(Box::new(parse_node(value)?))),
        "EQ" => parse_equal(value),
        "GT" => parse_comparison(ComparisonOperator::Gt, value),
        "GE" => parse_comparison(ComparisonOperator::Ge, value),
        "LT" => parse_comparison(ComparisonOperator::Lt, value),
        "LE" => parse_comparison(ComparisonOperator::Le, value),
        "NE" => parse_comparison(ComparisonOperator::Ne, value),
        // Any non-boolean literal is treated as false.
        "OVERRIDE" => Ok(Node::Override(value.as_bool().unwrap_or(false))),
        _ => Err(Error::UnknownTargetingOperator(operator.clone())),
    }
}

fn parse_children(operator: &str, value: &Value) -> Result<Vec<Node>> {
    let children = value.as_array().ok_or_else(|| {
        Error::TargetingNode(format!("{operator} expects an array of predicates"))
    })?;
    children.iter().map(parse_node).collect()
}

fn parse_equal(value: &Value) -> Result<Node> {
    let (field, candidates) = operands(value, "EQ")?;

    let mut accepts_null = false;
    let mut values = Vec::new();
    let candidates = match candidates.as_array() {
        Some(array) => array.as_slice(),
        None => std::slice::from_ref(candidates),
    };
    for candidate in candidates {
        match candidate {
            Value::Null => accepts_null = true,
            Value::Bool(b) => values.push(b.to_string()),
            Value::Number(n) => values.push(canonical_number_string(n)),
            Value::String(s) => values.push(s.clone()),
            other => {
                return Err(Error::TargetingNode(format!(
                    "EQ values must be scalars, got {other}"
                )))
            }
        }
    }

    Ok(Node::Equal(EqualNode {
        field,
        accepts_null,
        values,
    }))
}

fn parse_comparison(operator: ComparisonOperator, value: &Value) -> Result<Node> {
    let (field, threshold) = operands(value, "comparison")?;
    let value = threshold.as_f64().ok_or_else(|| {
        Error::TargetingNode(format!(
            "comparison value must be numeric, got {threshold}"
        ))
    })?;
    Ok(Node::Comparison(ComparisonNode {
        field,
        operator,
        value,
    }))
}

/// Extract the `field` name and the `value`/`values` operand from an `EQ`/comparison node,
/// enforcing the exactly-two-keys shape.
fn operands<'a>(value: &'a Value, operator: &str) -> Result<(String, &'a Value)> {
    let object = value.as_object().ok_or_else(|| {
        Error::TargetingNode(format!("{operator} expects an object, got {value}"))
    })?;
    if object.len() != 2 {
        return Err(Error::TargetingNode(format!(
            "{operator} expects exactly a field and a value, got {} keys",
            object.len()
        )));
    }
    let field = object
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::TargetingNode(format!("{operator} is missing a field name")))?;
    let operand = object
        .get("value")
        .or_else(|| object.get("values"))
        .ok_or_else(|| Error::TargetingNode(format!("{operator} is missing a value")))?;
    Ok((field.to_lowercase(), operand))
}

/// Canonical decimal form of a JSON number, aligned with
/// [`AttributeValue::canonical_string`](crate::AttributeValue).
fn canonical_number_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        canonical_f64_string(n.as_f64().unwrap_or(f64::NAN))
    }
}

impl Node {
    fn evaluate(&self, inputs: &Attributes) -> bool {
        match self {
            // Vacuous truth: ALL of an empty list is true.
            Node::All(children) => children.iter().all(|child| child.evaluate(inputs)),
            // ANY of an empty list is false.
            Node::Any(children) => children.iter().any(|child| child.evaluate(inputs)),
            Node::Not(child) => !child.evaluate(inputs),
            Node::Equal(node) => node.evaluate(inputs),
            Node::Comparison(node) => node.evaluate(inputs),
            Node::Override(literal) => *literal,
        }
    }
}

impl EqualNode {
    fn evaluate(&self, inputs: &Attributes) -> bool {
        let candidate = match inputs.get(&self.field) {
            None | Some(AttributeValue::Null) => return self.accepts_null,
            Some(value) => value,
        };
        match candidate.canonical_string() {
            Some(canonical) => self.values.iter().any(|value| *value == canonical),
            None => self.accepts_null,
        }
    }
}

impl ComparisonNode {
    fn evaluate(&self, inputs: &Attributes) -> bool {
        // Missing, nil, and non-numeric fields never satisfy a comparison.
        let Some(candidate) = inputs.get(&self.field).and_then(AttributeValue::as_f64) else {
            return false;
        };
        match self.operator {
            ComparisonOperator::Gt => candidate > self.value,
            ComparisonOperator::Ge => candidate >= self.value,
            ComparisonOperator::Lt => candidate < self.value,
            ComparisonOperator::Le => candidate <= self.value,
            ComparisonOperator::Ne => candidate != self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Targeting;
    use crate::{Attributes, Error};

    fn targeting(document: serde_json::Value) -> Targeting {
        Targeting::new(&document).unwrap()
    }

    fn inputs(pairs: &[(&str, crate::AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn eq_matches_any_of_values() {
        let t = targeting(json!({"EQ": {"field": "country", "values": ["us", "ca"]}}));
        assert!(t.evaluate(&inputs(&[("country", "us".into())])));
        assert!(t.evaluate(&inputs(&[("country", "ca".into())])));
        assert!(!t.evaluate(&inputs(&[("country", "de".into())])));
        assert!(!t.evaluate(&inputs(&[])));
    }

    #[test]
    fn eq_coerces_numeric_widths() {
        let t = targeting(json!({"EQ": {"field": "age", "value": 5}}));
        assert!(t.evaluate(&inputs(&[("age", 5i8.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5i16.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5i32.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5i64.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5u8.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5u16.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5u32.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5u64.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5f32.into())])));
        assert!(t.evaluate(&inputs(&[("age", 5f64.into())])));
        assert!(!t.evaluate(&inputs(&[("age", 6.into())])));
    }

    #[test]
    fn eq_float_predicate_matches_int_input() {
        let t = targeting(json!({"EQ": {"field": "age", "value": 5.0}}));
        assert!(t.evaluate(&inputs(&[("age", 5.into())])));
    }

    #[test]
    fn eq_null_matches_missing_field() {
        let t = targeting(json!({"EQ": {"field": "beta_group", "value": null}}));
        assert!(t.evaluate(&inputs(&[])));
        assert!(t.evaluate(&inputs(&[("beta_group", crate::AttributeValue::Null)])));
        assert!(!t.evaluate(&inputs(&[("beta_group", "yes".into())])));
    }

    #[test]
    fn eq_bool_values() {
        let t = targeting(json!({"EQ": {"field": "employee", "value": true}}));
        assert!(t.evaluate(&inputs(&[("employee", true.into())])));
        assert!(!t.evaluate(&inputs(&[("employee", false.into())])));
    }

    #[test]
    fn comparisons() {
        let gt = targeting(json!({"GT": {"field": "age", "value": 18}}));
        assert!(gt.evaluate(&inputs(&[("age", 19.into())])));
        assert!(!gt.evaluate(&inputs(&[("age", 18.into())])));

        let ge = targeting(json!({"GE": {"field": "age", "value": 18}}));
        assert!(ge.evaluate(&inputs(&[("age", 18.into())])));
        assert!(!ge.evaluate(&inputs(&[("age", 17.into())])));

        let lt = targeting(json!({"LT": {"field": "age", "value": 18}}));
        assert!(lt.evaluate(&inputs(&[("age", 17.into())])));
        assert!(!lt.evaluate(&inputs(&[("age", 18.into())])));

        let le = targeting(json!({"LE": {"field": "age", "value": 18}}));
        assert!(le.evaluate(&inputs(&[("age", 18.into())])));
        assert!(!le.evaluate(&inputs(&[("age", 19.into())])));

        let ne = targeting(json!({"NE": {"field": "age", "value": 18}}));
        assert!(ne.evaluate(&inputs(&[("age", 19.into())])));
        assert!(!ne.evaluate(&inputs(&[("age", 18.into())])));
    }

    #[test]
    fn comparisons_widen_any_numeric_input() {
        let gt = targeting(json!({"GT": {"field": "age", "value": 18}}));
        assert!(gt.evaluate(&inputs(&[("age", 19u8.into())])));
        assert!(gt.evaluate(&inputs(&[("age", 18.5f32.into())])));
    }

    #[test]
    fn comparisons_are_false_for_missing_or_nil_fields() {
        for op in ["GT", "GE", "LT", "LE", "NE"] {
            let t = targeting(json!({op: {"field": "age", "value": 18}}));
            assert!(!t.evaluate(&inputs(&[])), "{op} with missing field");
            assert!(
                !t.evaluate(&inputs(&[("age", crate::AttributeValue::Null)])),
                "{op} with nil field"
            );
            assert!(
                !t.evaluate(&inputs(&[("age", "18".into())])),
                "{op} with non-numeric field"
            );
        }
    }

    #[test]
    fn all_and_any() {
        let t = targeting(json!({"ALL": [
            {"EQ": {"field": "country", "value": "us"}},
            {"GE": {"field": "age", "value": 21}},
        ]}));
        assert!(t.evaluate(&inputs(&[("country", "us".into()), ("age", 30.into())])));
        assert!(!t.evaluate(&inputs(&[("country", "us".into()), ("age", 20.into())])));

        let t = targeting(json!({"ANY": [
            {"EQ": {"field": "country", "value": "us"}},
            {"GE": {"field": "age", "value": 21}},
        ]}));
        assert!(t.evaluate(&inputs(&[("country", "us".into()), ("age", 20.into())])));
        assert!(!t.evaluate(&inputs(&[("country", "de".into()), ("age", 20.into())])));
    }

    #[test]
    fn empty_all_is_true_empty_any_is_false() {
        assert!(targeting(json!({"ALL": []})).evaluate(&inputs(&[])));
        assert!(!targeting(json!({"ANY": []})).evaluate(&inputs(&[])));
    }

    #[test]
    fn not_negates() {
        let t = targeting(json!({"NOT": {"EQ": {"field": "country", "value": "us"}}}));
        assert!(!t.evaluate(&inputs(&[("country", "us".into())])));
        assert!(t.evaluate(&inputs(&[("country", "de".into())])));
    }

    #[test]
    fn override_literal() {
        assert!(targeting(json!({"OVERRIDE": true})).evaluate(&inputs(&[])));
        assert!(!targeting(json!({"OVERRIDE": false})).evaluate(&inputs(&[])));
        // Non-boolean literals are treated as false.
        assert!(!targeting(json!({"OVERRIDE": "yes"})).evaluate(&inputs(&[])));
    }

    #[test]
    fn operators_are_case_insensitive() {
        let t = targeting(json!({"eq": {"field": "country", "value": "us"}}));
        assert!(t.evaluate(&inputs(&[("country", "us".into())])));
        assert!(targeting(json!({"override": true})).evaluate(&inputs(&[])));
    }

    #[test]
    fn field_names_are_lower_cased() {
        let t = targeting(json!({"EQ": {"field": "Country", "value": "us"}}));
        assert!(t.evaluate(&inputs(&[("country", "us".into())])));
    }

    #[test]
    fn unknown_operator_is_a_distinct_error() {
        let err = Targeting::new(&json!({"REGEX": {"field": "email", "value": ".*"}}))
            .unwrap_err();
        assert!(
            matches!(err, Error::UnknownTargetingOperator(ref op) if op == "REGEX"),
            "{err:?}"
        );
    }

    #[test]
    fn malformed_nodes() {
        // More than one key at the top level.
        assert!(matches!(
            Targeting::new(&json!({"ALL": [], "ANY": []})),
            Err(Error::TargetingNode(_))
        ));
        // ALL with a non-array operand.
        assert!(matches!(
            Targeting::new(&json!({"ALL": {"EQ": {"field": "a", "value": 1}}})),
            Err(Error::TargetingNode(_))
        ));
        // EQ with an extra key.
        assert!(matches!(
            Targeting::new(&json!({"EQ": {"field": "a", "value": 1, "values": [2]}})),
            Err(Error::TargetingNode(_))
        ));
        // EQ missing the field.
        assert!(matches!(
            Targeting::new(&json!({"EQ": {"value": 1, "values": [2]}})),
            Err(Error::TargetingNode(_))
        ));
        // Comparison with a non-numeric threshold.
        assert!(matches!(
            Targeting::new(&json!({"GT": {"field": "age", "value": "old"}})),
            Err(Error::TargetingNode(_))
        ));
        // NOT with a non-predicate operand.
        assert!(matches!(
            Targeting::new(&json!({"NOT": [1, 2]})),
            Err(Error::TargetingNode(_))
        ));
        // Unknown operators nested in a known one are still rejected.
        assert!(matches!(
            Targeting::new(&json!({"ALL": [{"NEW_OP": true}]})),
            Err(Error::UnknownTargetingOperator(_))
        ));
    }
}
