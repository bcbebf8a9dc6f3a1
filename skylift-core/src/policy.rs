//! Policy - IAM policy documents and a local evaluator
//!
//! Documents are built from typed statements whose principals, resources
//! and condition values may refer to resource outputs. They render to IAM
//! JSON through `Value::Json`, so the engine serializes them after every
//! reference is resolved.
//!
//! The evaluator answers "would this document allow the request" for a
//! document whose references can be resolved. It covers the subset of IAM
//! semantics the composed policies use: explicit deny wins over allow,
//! `*`/`?` wildcards in actions and resources, principal matching for
//! resource-based statements and the string/ARN condition operators.

use std::collections::{BTreeMap, HashMap};

use crate::resource::{Reference, Value};

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// Principal of a resource-based or trust statement
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// AWS service principal (e.g., "cloudfront.amazonaws.com")
    Service(String),
    /// IAM identity by ARN
    Aws(Value),
    /// Anyone
    Any,
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(name.into())
    }

    pub fn aws(arn: impl Into<Value>) -> Self {
        Principal::Aws(arn.into())
    }
}

/// Condition block entry: `test` operator over a context `variable`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub test: String,
    pub variable: String,
    pub values: Vec<Value>,
}

impl Condition {
    pub fn new<V: Into<Value>>(
        test: impl Into<String>,
        variable: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            test: test.into(),
            variable: variable.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn string_equals<V: Into<Value>>(
        variable: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new("StringEquals", variable, values)
    }

    pub fn arn_equals<V: Into<Value>>(
        variable: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new("ArnEquals", variable, values)
    }
}

/// Single policy statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub conditions: Vec<Condition>,
}

impl Statement {
    pub fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principals: Vec::new(),
            actions: Vec::new(),
            resources: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn actions<S: Into<String>>(mut self, actions: impl IntoIterator<Item = S>) -> Self {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resources<V: Into<Value>>(mut self, resources: impl IntoIterator<Item = V>) -> Self {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    fn to_value(&self) -> Value {
        let mut entry = BTreeMap::new();
        if let Some(sid) = &self.sid {
            entry.insert("Sid".to_string(), Value::from(sid));
        }
        entry.insert("Effect".to_string(), Value::from(self.effect.as_str()));

        if !self.principals.is_empty() {
            entry.insert("Principal".to_string(), principals_value(&self.principals));
        }
        entry.insert("Action".to_string(), Value::list(self.actions.iter()));
        if !self.resources.is_empty() {
            entry.insert("Resource".to_string(), Value::List(self.resources.clone()));
        }

        if !self.conditions.is_empty() {
            let mut tests: BTreeMap<String, Value> = BTreeMap::new();
            for condition in &self.conditions {
                let variables = tests
                    .entry(condition.test.clone())
                    .or_insert_with(|| Value::Map(BTreeMap::new()));
                if let Value::Map(variables) = variables {
                    variables.insert(
                        condition.variable.clone(),
                        Value::List(condition.values.clone()),
                    );
                }
            }
            entry.insert("Condition".to_string(), Value::Map(tests));
        }

        Value::Map(entry)
    }

    fn matches(&self, request: &AccessRequest, outputs: &dyn Fn(&Reference) -> Option<String>) -> bool {
        if !self.principals.is_empty()
            && !self
                .principals
                .iter()
                .any(|p| principal_matches(p, &request.principal, outputs))
        {
            return false;
        }

        if !self
            .actions
            .iter()
            .any(|a| wildcard_match(&a.to_ascii_lowercase(), &request.action.to_ascii_lowercase()))
        {
            return false;
        }

        if !self.resources.iter().any(|r| {
            r.resolve(&outputs)
                .is_some_and(|pattern| wildcard_match(&pattern, &request.resource))
        }) {
            return false;
        }

        self.conditions
            .iter()
            .all(|c| condition_holds(c, request, outputs))
    }
}

fn principals_value(principals: &[Principal]) -> Value {
    if principals.iter().any(|p| matches!(p, Principal::Any)) {
        return Value::from("*");
    }

    let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for principal in principals {
        match principal {
            Principal::Service(name) => grouped
                .entry("Service".to_string())
                .or_default()
                .push(Value::from(name)),
            Principal::Aws(arn) => grouped
                .entry("AWS".to_string())
                .or_default()
                .push(arn.clone()),
            Principal::Any => {}
        }
    }
    Value::Map(
        grouped
            .into_iter()
            .map(|(k, v)| (k, Value::List(v)))
            .collect(),
    )
}

/// IAM policy document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: impl IntoIterator<Item = Statement>) -> Self {
        Self {
            statements: statements.into_iter().collect(),
        }
    }

    /// Render as a JSON document attribute
    pub fn to_value(&self) -> Value {
        Value::json(Value::map([
            ("Version", Value::from(POLICY_VERSION)),
            (
                "Statement",
                Value::List(self.statements.iter().map(Statement::to_value).collect()),
            ),
        ]))
    }

    /// Every resource pattern that appears in the document
    pub fn resources(&self) -> Vec<&Value> {
        self.statements
            .iter()
            .flat_map(|s| s.resources.iter())
            .collect()
    }

    /// Evaluate a request against the document
    pub fn evaluate<F>(&self, request: &AccessRequest, outputs: &F) -> Decision
    where
        F: Fn(&Reference) -> Option<String>,
    {
        let mut allowed = false;
        for statement in &self.statements {
            if !statement.matches(request, outputs) {
                continue;
            }
            match statement.effect {
                Effect::Deny => return Decision::ExplicitDeny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::ImplicitDeny
        }
    }
}

/// Caller identity of an evaluated request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPrincipal {
    Service(String),
    Aws(String),
}

/// Request to evaluate against a policy
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub principal: RequestPrincipal,
    pub action: String,
    pub resource: String,
    pub context: HashMap<String, String>,
}

impl AccessRequest {
    pub fn new(
        principal: RequestPrincipal,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            principal,
            action: action.into(),
            resource: resource.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    ExplicitDeny,
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

fn principal_matches(
    principal: &Principal,
    request: &RequestPrincipal,
    outputs: &dyn Fn(&Reference) -> Option<String>,
) -> bool {
    match (principal, request) {
        (Principal::Any, _) => true,
        (Principal::Service(expected), RequestPrincipal::Service(actual)) => expected == actual,
        (Principal::Aws(expected), RequestPrincipal::Aws(actual)) => expected
            .resolve(&outputs)
            .is_some_and(|arn| arn == "*" || &arn == actual),
        _ => false,
    }
}

fn condition_holds(
    condition: &Condition,
    request: &AccessRequest,
    outputs: &dyn Fn(&Reference) -> Option<String>,
) -> bool {
    // Missing context keys never satisfy a positive operator
    let Some(actual) = request.context.get(&condition.variable) else {
        return false;
    };

    let mut expected = condition.values.iter().filter_map(|v| v.resolve(&outputs));
    match condition.test.as_str() {
        "StringEquals" | "ArnEquals" => expected.any(|e| &e == actual),
        "StringNotEquals" | "ArnNotEquals" => expected.all(|e| &e != actual),
        "StringLike" | "ArnLike" => expected.any(|e| wildcard_match(&e, actual)),
        // Unsupported operators fail closed
        _ => false,
    }
}

/// Glob match with `*` (any run) and `?` (any single character)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
