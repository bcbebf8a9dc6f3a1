//! Container backend: Fargate service behind an HTTPS load balancer
//!
//! The image is pulled from a repository declared here. Unless a tag is
//! pinned in configuration, the tag is resolved by the engine from the most
//! recent image, so the first deployment needs an image pushed between
//! creating the repository and creating the service.

use std::collections::BTreeMap;

use skylift_core::lookup::{CertificateSummary, HostedZone};
use skylift_core::policy::{PolicyDocument, Principal, Statement};
use skylift_core::program::Outputs;
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Resource, ResourceKind, Segment, Value};
use skylift_core::stack::Stack;

use crate::config::{BackendSettings, SiteConfig};
use crate::dns::{AliasTarget, compose_alias_record};
use crate::error::ComposeError;
use crate::iam::{BackendTargets, PipelineUser, compose_backend_pipeline_user};

pub const ECS_TASK_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

const SSL_POLICY: &str = "ELBSecurityPolicy-2016-08";
const HEALTH_CHECK_PATH: &str = "/_health";
const HEALTH_CHECK_INTERVAL_SECONDS: i64 = 180;
const ANY_IPV4: &str = "0.0.0.0/0";
const ANY_IPV6: &str = "::/0";

#[derive(Debug, Clone)]
pub struct Backend {
    pub cluster: Handle,
    pub vpc: Handle,
    pub load_balancer: Handle,
    pub record: Handle,
    pub repository: Handle,
    /// Engine-side lookup of the newest image; absent when a tag is pinned
    pub existing_image: Option<Handle>,
    pub secret: Handle,
    pub secret_version: Handle,
    pub execution_role: Handle,
    pub task_role: Handle,
    pub task_definition: Handle,
    pub security_group: Handle,
    pub service: Handle,
    pub pipeline_user: PipelineUser,
}

impl Backend {
    pub fn outputs(&self, config: &SiteConfig) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(
            "backendUrl",
            Value::interpolate([
                Segment::from("http://"),
                self.load_balancer.output("loadBalancer.dnsName").into(),
            ]),
        );
        outputs.insert("apiDomainURL", config.api_domain_url());
        outputs.insert("repoName", self.repository.attr("repository.name"));
        outputs.insert("serviceName", self.service.attr("service.name"));
        outputs.insert("clusterName", self.cluster.name());
        outputs.insert("containerName", &config.backend.container_name);
        outputs
    }
}

/// Trust policy for roles assumed by ECS tasks
pub fn ecs_tasks_trust_policy() -> PolicyDocument {
    PolicyDocument::new([Statement::allow()
        .principal(Principal::service("ecs-tasks.amazonaws.com"))
        .actions(["sts:AssumeRole"])])
}

/// `<secret ARN>:<KEY>::` selects one JSON key of the secret's current version
pub fn secret_reference(secret: &Handle, key: &str) -> Value {
    Value::interpolate([
        Segment::from(secret.output("arn")),
        Segment::from(format!(":{}::", key)),
    ])
}

/// One container secret per bundle key
pub fn container_secrets(secret: &Handle, bundle: &BTreeMap<String, String>) -> Value {
    Value::list(bundle.keys().map(|key| {
        Value::map([
            ("name", Value::from(key)),
            ("value_from", secret_reference(secret, key)),
        ])
    }))
}

fn secret_bundle(bundle: &BTreeMap<String, String>) -> Value {
    Value::secret(Value::json(Value::Map(
        bundle
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect(),
    )))
}

fn tcp_ingress(port: u16, source: (&str, Value)) -> Value {
    Value::map([
        ("from_port", Value::from(port)),
        ("to_port", Value::from(port)),
        ("protocol", Value::from("tcp")),
        source,
    ])
}

fn load_balancer_resource(settings: &BackendSettings, certificate: &CertificateSummary) -> Resource {
    let public = || ("cidr_blocks", Value::list([ANY_IPV4]));
    Resource::new("awsx:lb:ApplicationLoadBalancer", "loadbalancer")
        .with_kind(ResourceKind::Component)
        .with_attribute(
            "listener",
            Value::map([
                ("certificate_arn", Value::from(&certificate.arn)),
                ("port", Value::Int(443)),
                ("protocol", Value::from("HTTPS")),
                ("ssl_policy", Value::from(SSL_POLICY)),
            ]),
        )
        .with_attribute(
            "default_security_group",
            Value::map([(
                "args",
                Value::map([(
                    "ingress",
                    Value::list([tcp_ingress(443, public()), tcp_ingress(80, public())]),
                )]),
            )]),
        )
        .with_attribute(
            "default_target_group",
            Value::map([
                ("port", Value::from(settings.container_port)),
                ("protocol", Value::from("HTTP")),
                ("target_type", Value::from("ip")),
                (
                    "health_check",
                    Value::map([
                        ("enabled", Value::Bool(true)),
                        ("matcher", Value::from("200-299")),
                        ("path", Value::from(HEALTH_CHECK_PATH)),
                        ("interval", Value::Int(HEALTH_CHECK_INTERVAL_SECONDS)),
                        ("protocol", Value::from("HTTP")),
                    ]),
                ),
            ]),
        )
}

fn declare_task_role(
    stack: &mut Stack,
    ctx: &ProviderContext,
    name: &str,
) -> Result<Handle, ComposeError> {
    Ok(ctx.declare_in(
        stack,
        Resource::new("aws:iam:Role", name)
            .with_attribute("assume_role_policy", ecs_tasks_trust_policy().to_value()),
    )?)
}

pub fn compose_backend(
    stack: &mut Stack,
    ctx: &ProviderContext,
    config: &SiteConfig,
    certificate: &CertificateSummary,
    zone: &HostedZone,
) -> Result<Backend, ComposeError> {
    let settings = &config.backend;

    let cluster = ctx.declare_in(stack, Resource::new("aws:ecs:Cluster", "cluster"))?;
    let vpc = ctx.declare_in(
        stack,
        Resource::new("awsx:ec2:DefaultVpc", "default-vpc").with_kind(ResourceKind::Component),
    )?;

    let load_balancer = ctx.declare_in(stack, load_balancer_resource(settings, certificate))?;
    let record = compose_alias_record(
        stack,
        ctx,
        zone,
        &config.api_subdomain(),
        &config.api_domain_name(),
        AliasTarget {
            dns_name: load_balancer.attr("loadBalancer.dnsName"),
            zone_id: load_balancer.attr("loadBalancer.zoneId"),
        },
    )?;

    let repository = ctx.declare_in(
        stack,
        Resource::new("awsx:ecr:Repository", "repo")
            .with_kind(ResourceKind::Component)
            .with_attribute("force_delete", true)
            .with_attribute(
                "lifecycle_policy",
                Value::map([(
                    "rules",
                    Value::list([Value::map([
                        ("description", Value::from("Max 1 image")),
                        ("maximum_number_of_images", Value::Int(1)),
                        ("tag_status", Value::from("any")),
                    ])]),
                )]),
            ),
    )?;

    let (existing_image, tag) = match &settings.image_tag {
        Some(tag) => (None, Segment::from(tag.as_str())),
        None => {
            let image = ctx.declare_in(
                stack,
                Resource::new("aws:ecr:getImage", "existing-image")
                    .with_kind(ResourceKind::DataSource)
                    .with_attribute("repository_name", repository.attr("repository.name"))
                    .with_attribute("most_recent", true),
            )?;
            let tag = Segment::from(image.output("imageTags[0]"));
            (Some(image), tag)
        }
    };

    let secret = ctx.declare_in(stack, Resource::new("aws:secretsmanager:Secret", "api-secrets"))?;
    let version_name = stack.name().to_string();
    let secret_version = ctx.declare_in(
        stack,
        Resource::new("aws:secretsmanager:SecretVersion", version_name)
            .with_binding("apiSecretsVersion")
            .with_attribute("secret_id", secret.id())
            .with_attribute("secret_string", secret_bundle(&settings.secrets)),
    )?;

    let execution_role = declare_task_role(stack, ctx, "execution-role")?;
    ctx.declare_in(
        stack,
        Resource::new("aws:iam:RolePolicyAttachment", "rpa-execution")
            .with_attribute("role", execution_role.name())
            .with_attribute("policy_arn", ECS_TASK_EXECUTION_POLICY),
    )?;
    let secrets_policy = ctx.declare_in(
        stack,
        Resource::new("aws:iam:Policy", "secretsPolicy").with_attribute(
            "policy",
            PolicyDocument::new([Statement::allow()
                .actions(["secretsmanager:GetSecretValue"])
                .resources([secret.arn()])])
            .to_value(),
        ),
    )?;
    ctx.declare_in(
        stack,
        Resource::new("aws:iam:RolePolicyAttachment", "rpa-secrets")
            .with_attribute("role", execution_role.name())
            .with_attribute("policy_arn", secrets_policy.arn()),
    )?;
    let task_role = declare_task_role(stack, ctx, "task-role")?;

    let container = Value::map([
        ("name", Value::from(&settings.container_name)),
        (
            "image",
            Value::interpolate([
                Segment::from(repository.output("url")),
                Segment::from(":"),
                tag,
            ]),
        ),
        ("cpu", Value::from(settings.cpu)),
        ("memory", Value::from(settings.memory)),
        ("essential", Value::Bool(true)),
        (
            "port_mappings",
            Value::list([Value::map([
                ("host_port", Value::from(settings.container_port)),
                ("container_port", Value::from(settings.container_port)),
                ("target_group", load_balancer.attr("defaultTargetGroup")),
            ])]),
        ),
        ("secrets", container_secrets(&secret, &settings.secrets)),
    ]);

    let task_definition = ctx.declare_in(
        stack,
        Resource::new("awsx:ecs:FargateTaskDefinition", "api-task-def")
            .with_kind(ResourceKind::Component)
            .with_attribute("container", container)
            .with_attribute(
                "execution_role",
                Value::map([("role_arn", execution_role.arn())]),
            )
            .with_attribute("task_role", Value::map([("role_arn", task_role.arn())]))
            .depends_on(&secret_version),
    )?;

    let security_group = ctx.declare_in(
        stack,
        Resource::new("aws:ec2:SecurityGroup", "ECSSecurityGroup")
            .with_attribute("vpc_id", vpc.attr("vpcId"))
            .with_attribute(
                "ingress",
                Value::list([tcp_ingress(
                    settings.container_port,
                    (
                        "security_groups",
                        Value::list([load_balancer.attr("defaultSecurityGroup.id")]),
                    ),
                )]),
            )
            .with_attribute(
                "egress",
                Value::list([Value::map([
                    ("from_port", Value::Int(0)),
                    ("to_port", Value::Int(0)),
                    ("protocol", Value::from("-1")),
                    ("cidr_blocks", Value::list([ANY_IPV4])),
                    ("ipv6_cidr_blocks", Value::list([ANY_IPV6])),
                ])]),
            ),
    )?;

    let service = ctx.declare_in(
        stack,
        Resource::new("awsx:ecs:FargateService", "service")
            .with_kind(ResourceKind::Component)
            .with_attribute("cluster", cluster.arn())
            .with_attribute("task_definition", task_definition.attr("taskDefinition.arn"))
            .with_attribute("desired_count", Value::from(settings.desired_count))
            .with_attribute(
                "load_balancers",
                Value::list([Value::map([
                    ("container_name", Value::from(&settings.container_name)),
                    ("container_port", Value::from(settings.container_port)),
                    (
                        "target_group_arn",
                        load_balancer.attr("defaultTargetGroup.arn"),
                    ),
                ])]),
            )
            .with_attribute(
                "network_configuration",
                Value::map([
                    ("assign_public_ip", Value::Bool(true)),
                    ("subnets", vpc.attr("publicSubnetIds")),
                    ("security_groups", Value::list([security_group.id()])),
                ]),
            ),
    )?;

    let pipeline_user = compose_backend_pipeline_user(
        stack,
        ctx,
        BackendTargets {
            repository: &repository,
            cluster: &cluster,
            execution_role: Some(&execution_role),
            task_role: Some(&task_role),
        },
    )?;

    Ok(Backend {
        cluster,
        vpc,
        load_balancer,
        record,
        repository,
        existing_image,
        secret,
        secret_version,
        execution_role,
        task_role,
        task_definition,
        security_group,
        service,
        pipeline_user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_core::resource::Reference;

    use crate::testing::{API_CERT_ARN, certificates, site_config, zone};

    fn compose(config: &SiteConfig) -> (Stack, Backend) {
        let mut stack = Stack::new("dev");
        let ctx = ProviderContext::declare(&mut stack, "primary", "us-east-1").unwrap();
        let backend =
            compose_backend(&mut stack, &ctx, config, &certificates().api, &zone()).unwrap();
        (stack, backend)
    }

    fn with_secrets() -> SiteConfig {
        let mut config = site_config();
        config.backend.secrets = BTreeMap::from([
            ("DATABASE_URL".to_string(), "postgres://db".to_string()),
            ("JWT_SECRET".to_string(), "s3cr3t".to_string()),
        ]);
        config
    }

    fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
        match value {
            Value::Map(map) => &map[key],
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn one_task_secret_per_bundle_key() {
        let config = with_secrets();
        let (stack, backend) = compose(&config);
        let task = stack.get(&backend.task_definition.binding).unwrap();
        let Value::List(secrets) = field(&task.attributes["container"], "secrets") else {
            panic!("Expected list");
        };
        assert_eq!(secrets.len(), config.backend.secrets.len());

        let arns = |r: &Reference| {
            (r.binding == backend.secret.binding && r.path == "arn")
                .then(|| "arn:aws:secretsmanager:us-east-1:1:secret:api".to_string())
        };
        for (secret, key) in secrets.iter().zip(config.backend.secrets.keys()) {
            assert_eq!(field(secret, "name"), &Value::from(key));
            assert_eq!(
                field(secret, "value_from").resolve(&arns),
                Some(format!("arn:aws:secretsmanager:us-east-1:1:secret:api:{}::", key))
            );
        }
    }

    #[test]
    fn secret_version_holds_bundle_as_secret_json() {
        let (stack, backend) = compose(&with_secrets());
        let version = stack.get(&backend.secret_version.binding).unwrap();
        let Value::Secret(inner) = &version.attributes["secret_string"] else {
            panic!("Expected secret");
        };
        let Value::Json(doc) = inner.as_ref() else {
            panic!("Expected json");
        };
        assert_eq!(field(doc, "JWT_SECRET"), &Value::from("s3cr3t"));
    }

    #[test]
    fn image_tag_is_looked_up_unless_pinned() {
        let (stack, backend) = compose(&site_config());
        let image = backend.existing_image.as_ref().unwrap();
        assert!(stack.get(&image.binding).unwrap().is_data_source());

        let task = stack.get(&backend.task_definition.binding).unwrap();
        assert_eq!(
            field(&task.attributes["container"], "image"),
            &Value::interpolate([
                Segment::from(backend.repository.output("url")),
                Segment::from(":"),
                Segment::from(image.output("imageTags[0]")),
            ])
        );

        let mut pinned = site_config();
        pinned.backend.image_tag = Some("v7".to_string());
        let (stack, backend) = compose(&pinned);
        assert!(backend.existing_image.is_none());
        let task = stack.get(&backend.task_definition.binding).unwrap();
        assert_eq!(
            field(&task.attributes["container"], "image"),
            &Value::interpolate([
                Segment::from(backend.repository.output("url")),
                Segment::from(":v7"),
            ])
        );
    }

    #[test]
    fn container_port_is_reachable_only_from_load_balancer() {
        let mut config = site_config();
        config.backend.container_port = 1337;
        let (stack, backend) = compose(&config);
        let sg = stack.get(&backend.security_group.binding).unwrap();
        let Value::List(ingress) = &sg.attributes["ingress"] else {
            panic!("Expected list");
        };
        assert_eq!(ingress.len(), 1);
        assert_eq!(field(&ingress[0], "from_port"), &Value::Int(1337));
        assert_eq!(
            field(&ingress[0], "security_groups"),
            &Value::list([backend.load_balancer.attr("defaultSecurityGroup.id")])
        );

        let lb = stack.get(&backend.load_balancer.binding).unwrap();
        assert_eq!(
            field(&lb.attributes["listener"], "certificate_arn"),
            &Value::from(API_CERT_ARN)
        );
        let target_group = &lb.attributes["default_target_group"];
        assert_eq!(field(target_group, "port"), &Value::Int(1337));
        let health_check = field(target_group, "health_check");
        assert_eq!(field(health_check, "path"), &Value::from("/_health"));
        assert_eq!(field(health_check, "interval"), &Value::Int(180));
        assert_eq!(field(health_check, "matcher"), &Value::from("200-299"));

        let Value::List(egress) = &sg.attributes["egress"] else {
            panic!("Expected list");
        };
        assert_eq!(egress.len(), 1);
        assert_eq!(field(&egress[0], "protocol"), &Value::from("-1"));
        assert_eq!(field(&egress[0], "from_port"), &Value::Int(0));
        assert_eq!(field(&egress[0], "to_port"), &Value::Int(0));
        assert_eq!(field(&egress[0], "cidr_blocks"), &Value::list(["0.0.0.0/0"]));
        assert_eq!(field(&egress[0], "ipv6_cidr_blocks"), &Value::list(["::/0"]));
    }

    #[test]
    fn repository_keeps_a_single_image() {
        let (stack, backend) = compose(&site_config());
        let repo = stack.get(&backend.repository.binding).unwrap();
        assert_eq!(repo.attributes["force_delete"], Value::Bool(true));

        let Value::List(rules) = field(&repo.attributes["lifecycle_policy"], "rules") else {
            panic!("Expected list");
        };
        assert_eq!(rules.len(), 1);
        assert_eq!(field(&rules[0], "maximum_number_of_images"), &Value::Int(1));
        assert_eq!(field(&rules[0], "tag_status"), &Value::from("any"));
    }

    #[test]
    fn service_runs_configured_count_with_public_ip() {
        let mut config = site_config();
        config.backend.desired_count = 3;
        let (stack, backend) = compose(&config);
        let service = stack.get(&backend.service.binding).unwrap();
        assert_eq!(service.attributes["desired_count"], Value::Int(3));

        let network = &service.attributes["network_configuration"];
        assert_eq!(field(network, "assign_public_ip"), &Value::Bool(true));
        assert_eq!(
            field(network, "security_groups"),
            &Value::list([backend.security_group.id()])
        );
    }

    #[test]
    fn api_record_and_outputs() {
        let config = site_config();
        let (stack, backend) = compose(&config);
        let record = stack.get(&backend.record.binding).unwrap();
        assert_eq!(record.attributes["name"], Value::from("api-dev"));
        assert_eq!(record.id.name, "api-dev.example.com");

        let outputs = backend.outputs(&config);
        assert_eq!(
            outputs.get("apiDomainURL"),
            Some(&Value::from("https://api-dev.example.com"))
        );
        assert_eq!(
            outputs.get("containerName"),
            Some(&Value::from("dev-backend-container"))
        );
    }

    #[test]
    fn execution_role_can_read_the_secret() {
        let (stack, backend) = compose(&site_config());
        let attachments: Vec<&Resource> = stack
            .resources()
            .iter()
            .filter(|r| r.id.resource_type == "aws:iam:RolePolicyAttachment")
            .collect();
        assert_eq!(attachments.len(), 2);
        assert!(
            attachments
                .iter()
                .all(|a| a.attributes["role"] == backend.execution_role.name())
        );
        assert!(
            attachments
                .iter()
                .any(|a| a.attributes["policy_arn"] == Value::from(ECS_TASK_EXECUTION_POLICY))
        );
    }
}
