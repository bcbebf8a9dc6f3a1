//! Alias records in the site's hosted zone

use skylift_core::graph::GraphError;
use skylift_core::lookup::HostedZone;
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Resource, Value};
use skylift_core::stack::Stack;

/// Endpoint an alias record points at
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub dns_name: Value,
    pub zone_id: Value,
}

/// Declare an `A` alias record `<label>` in `zone`
///
/// `fqdn` names the resource; the record itself is relative to the zone.
pub fn compose_alias_record(
    stack: &mut Stack,
    ctx: &ProviderContext,
    zone: &HostedZone,
    label: &str,
    fqdn: &str,
    target: AliasTarget,
) -> Result<Handle, GraphError> {
    ctx.declare_in(
        stack,
        Resource::new("aws:route53:Record", fqdn)
            .with_attribute("name", label)
            .with_attribute("zone_id", &zone.id)
            .with_attribute("type", "A")
            .with_attribute(
                "aliases",
                Value::list([Value::map([
                    ("name", target.dns_name),
                    ("zone_id", target.zone_id),
                    ("evaluate_target_health", Value::Bool(true)),
                ])]),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::zone;

    #[test]
    fn alias_record_points_at_target() {
        let mut stack = Stack::new("dev");
        let ctx = ProviderContext::declare(&mut stack, "primary", "us-east-1").unwrap();
        let cdn = stack
            .declare(Resource::new("aws:cloudfront:Distribution", "cdn"))
            .unwrap();

        let record = compose_alias_record(
            &mut stack,
            &ctx,
            &zone(),
            "dev",
            "dev.example.com",
            AliasTarget {
                dns_name: cdn.attr("domainName"),
                zone_id: cdn.attr("hostedZoneId"),
            },
        )
        .unwrap();

        let resource = stack.get(&record.binding).unwrap();
        assert_eq!(resource.binding, "devExampleCom");
        assert_eq!(resource.attributes["name"], Value::from("dev"));
        assert_eq!(resource.attributes["zone_id"], Value::from("Z123EXAMPLE"));
        assert_eq!(resource.attributes["type"], Value::from("A"));
        assert_eq!(
            resource.attributes["aliases"],
            Value::list([Value::map([
                ("name", cdn.attr("domainName")),
                ("zone_id", cdn.attr("hostedZoneId")),
                ("evaluate_target_health", Value::Bool(true)),
            ])])
        );
    }
}
