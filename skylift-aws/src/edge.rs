//! Edge function running the URI rewriter on origin requests

use std::collections::BTreeMap;

use skylift_core::graph::GraphError;
use skylift_core::policy::{PolicyDocument, Principal, Statement};
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Asset, Handle, Resource, Value};
use skylift_core::stack::Stack;

use crate::rewriter::render_handler_source;

const NAME: &str = "RewriterLambdaEdge";
const RUNTIME: &str = "nodejs18.x";
const HANDLER: &str = "index.handler";
const TIMEOUT_SECONDS: i64 = 5;

pub const LAMBDA_BASIC_EXECUTION_ROLE: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

#[derive(Debug, Clone)]
pub struct EdgeFunction {
    pub role: Handle,
    pub role_policy_attachment: Handle,
    pub function: Handle,
}

impl EdgeFunction {
    /// Versioned ARN CloudFront associations require
    pub fn qualified_arn(&self) -> Value {
        self.function.attr("qualifiedArn")
    }
}

/// Trust policy letting both Lambda and Lambda@Edge assume the role
pub fn edge_trust_policy() -> PolicyDocument {
    PolicyDocument::new([
        Statement::allow()
            .principal(Principal::service("lambda.amazonaws.com"))
            .actions(["sts:AssumeRole"]),
        Statement::allow()
            .principal(Principal::service("edgelambda.amazonaws.com"))
            .actions(["sts:AssumeRole"]),
    ])
}

/// Declare the rewriter function
///
/// The role is global and bound to `primary`; the function itself must live
/// in the edge region and is bound to `edge`.
pub fn compose_edge_function(
    stack: &mut Stack,
    primary: &ProviderContext,
    edge: &ProviderContext,
) -> Result<EdgeFunction, GraphError> {
    let role = primary.declare_in(
        stack,
        Resource::new("aws:iam:Role", format!("{}-Role", NAME))
            .with_attribute("assume_role_policy", edge_trust_policy().to_value()),
    )?;

    let role_policy_attachment = primary.declare_in(
        stack,
        Resource::new(
            "aws:iam:RolePolicyAttachment",
            format!("{}-RolePolicyAttachment", NAME),
        )
        .with_attribute("role", role.name())
        .with_attribute("policy_arn", LAMBDA_BASIC_EXECUTION_ROLE),
    )?;

    let mut code = BTreeMap::new();
    code.insert("index.js".to_string(), Asset::String(render_handler_source()));

    let function = edge.declare_in(
        stack,
        Resource::new("aws:lambda:Function", format!("{}-Function", NAME))
            .with_attribute("code", Value::Archive(code))
            .with_attribute("handler", HANDLER)
            .with_attribute("runtime", RUNTIME)
            .with_attribute("role", role.arn())
            .with_attribute("publish", true)
            .with_attribute("timeout", TIMEOUT_SECONDS),
    )?;

    Ok(EdgeFunction {
        role,
        role_policy_attachment,
        function,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::certificate::EDGE_REGION;

    #[test]
    fn function_is_published_in_edge_region() {
        let mut stack = Stack::new("dev");
        let primary = ProviderContext::declare(&mut stack, "primary", "eu-west-1").unwrap();
        let edge = ProviderContext::declare(&mut stack, EDGE_REGION, EDGE_REGION).unwrap();
        let composed = compose_edge_function(&mut stack, &primary, &edge).unwrap();

        let function = stack.get(&composed.function.binding).unwrap();
        assert_eq!(function.options.provider.as_deref(), Some(edge.provider().binding.as_str()));
        assert_eq!(function.attributes["publish"], Value::Bool(true));
        assert_eq!(function.attributes["timeout"], Value::Int(5));
        assert_eq!(function.attributes["runtime"], Value::from("nodejs18.x"));

        let Value::Archive(code) = &function.attributes["code"] else {
            panic!("Expected archive");
        };
        assert!(matches!(&code["index.js"], Asset::String(src) if src.contains("exports.handler")));

        let role = stack.get(&composed.role.binding).unwrap();
        assert_eq!(role.options.provider.as_deref(), Some("primary"));
    }

    #[test]
    fn edge_role_has_basic_execution() {
        let mut stack = Stack::new("dev");
        let primary = ProviderContext::declare(&mut stack, "primary", "eu-west-1").unwrap();
        let edge = ProviderContext::declare(&mut stack, EDGE_REGION, EDGE_REGION).unwrap();
        let composed = compose_edge_function(&mut stack, &primary, &edge).unwrap();

        let attachment = stack.get(&composed.role_policy_attachment.binding).unwrap();
        assert_eq!(attachment.id.resource_type, "aws:iam:RolePolicyAttachment");
        assert_eq!(attachment.attributes["role"], composed.role.name());
        assert_eq!(
            attachment.attributes["policy_arn"],
            Value::from("arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole")
        );
        assert_eq!(attachment.options.provider.as_deref(), Some("primary"));
    }

    #[test]
    fn trust_policy_admits_both_lambda_services() {
        let doc = edge_trust_policy();
        let principals: Vec<&Principal> =
            doc.statements.iter().flat_map(|s| s.principals.iter()).collect();
        assert_eq!(
            principals,
            vec![
                &Principal::service("lambda.amazonaws.com"),
                &Principal::service("edgelambda.amazonaws.com"),
            ]
        );
        assert!(doc.statements.iter().all(|s| s.actions == ["sts:AssumeRole"]));
        assert!(doc.statements.iter().all(|s| s.resources.is_empty()));
    }
}
