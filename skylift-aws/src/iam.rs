//! Pipeline users and the site bucket policy
//!
//! Each pipeline user gets one managed policy scoped to the resources it
//! deploys to. The bucket policy admits only the site's own distribution and
//! the frontend pipeline user.

use heck::{ToLowerCamelCase, ToUpperCamelCase};
use skylift_core::graph::GraphError;
use skylift_core::policy::{Condition, PolicyDocument, Principal, Statement};
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Resource, Segment, Value, arn_of};
use skylift_core::stack::Stack;

/// Actions needed to push images to a single repository
pub const ECR_PUSH_ACTIONS: [&str; 15] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:BatchGetImage",
    "ecr:CompleteLayerUpload",
    "ecr:DescribeImageScanFindings",
    "ecr:DescribeImages",
    "ecr:DescribeRepositories",
    "ecr:GetDownloadUrlForLayer",
    "ecr:GetLifecyclePolicy",
    "ecr:GetLifecyclePolicyPreview",
    "ecr:GetRepositoryPolicy",
    "ecr:InitiateLayerUpload",
    "ecr:ListImages",
    "ecr:ListTagsForResource",
    "ecr:PutImage",
    "ecr:UploadLayerPart",
];

/// Actions that do not support resource-level scoping
pub const UNSCOPED_DEPLOY_ACTIONS: [&str; 4] = [
    "ecr:GetAuthorizationToken",
    "ecs:RegisterTaskDefinition",
    "ecs:ListTaskDefinitions",
    "ecs:DescribeTaskDefinition",
];

const SITE_WRITE_ACTIONS: [&str; 3] = ["s3:PutObject", "s3:ListBucket", "s3:DeleteObject"];

#[derive(Debug, Clone)]
pub struct PipelineUser {
    pub policy: Handle,
    pub user: Handle,
    pub attachment: Handle,
}

/// `<bucket ARN>/*`
pub fn objects_of(bucket: &Handle) -> Value {
    Value::interpolate([Segment::from(bucket.output("arn")), "/*".into()])
}

/// Resource name prefix for a stack's pipeline users ("dev" -> "Dev")
fn pipeline_prefix(stack: &Stack) -> String {
    stack.name().to_upper_camel_case()
}

fn compose_pipeline_user(
    stack: &mut Stack,
    ctx: &ProviderContext,
    name: &str,
    document: &PolicyDocument,
) -> Result<PipelineUser, GraphError> {
    let base = name.to_lower_camel_case();

    let policy = ctx.declare_in(
        stack,
        Resource::new("aws:iam:Policy", name)
            .with_binding(format!("{}Policy", base))
            .with_attribute("policy", document.to_value()),
    )?;
    let user = ctx.declare_in(
        stack,
        Resource::new("aws:iam:User", name).with_binding(format!("{}User", base)),
    )?;
    let attachment = ctx.declare_in(
        stack,
        Resource::new("aws:iam:PolicyAttachment", name)
            .with_binding(format!("{}Attachment", base))
            .with_attribute("users", Value::list([user.name()]))
            .with_attribute("policy_arn", policy.arn()),
    )?;

    Ok(PipelineUser {
        policy,
        user,
        attachment,
    })
}

/// Frontend deploy permissions: sync the bucket and invalidate the cache
pub fn frontend_policy_document(bucket: &Handle, distribution: &Handle) -> PolicyDocument {
    PolicyDocument::new([Statement::allow()
        .actions([
            "s3:PutObject",
            "s3:ListBucket",
            "s3:DeleteObject",
            "cloudfront:CreateInvalidation",
        ])
        .resources([bucket.arn(), objects_of(bucket), distribution.arn()])])
}

pub fn compose_frontend_pipeline_user(
    stack: &mut Stack,
    ctx: &ProviderContext,
    bucket: &Handle,
    distribution: &Handle,
) -> Result<PipelineUser, GraphError> {
    let name = format!("{}-FE-Pipeline", pipeline_prefix(stack));
    compose_pipeline_user(
        stack,
        ctx,
        &name,
        &frontend_policy_document(bucket, distribution),
    )
}

/// Bucket policy for an origin access controlled bucket
pub fn bucket_policy_document(
    bucket: &Handle,
    distribution: &Handle,
    pipeline_user: &Handle,
) -> PolicyDocument {
    PolicyDocument::new([
        Statement::allow()
            .principal(Principal::service("cloudfront.amazonaws.com"))
            .actions(["s3:GetObject", "s3:ListBucket"])
            .resources([bucket.arn(), objects_of(bucket)])
            .condition(Condition::string_equals(
                "AWS:SourceArn",
                [distribution.arn()],
            )),
        Statement::allow()
            .principal(Principal::aws(pipeline_user.arn()))
            .actions(SITE_WRITE_ACTIONS)
            .resources([bucket.arn(), objects_of(bucket)]),
    ])
}

/// Attach the bucket policy once public policies are blocked
pub fn compose_bucket_policy(
    stack: &mut Stack,
    ctx: &ProviderContext,
    bucket: &Handle,
    public_access_block: &Handle,
    document: &PolicyDocument,
) -> Result<Handle, GraphError> {
    ctx.declare_in(
        stack,
        Resource::new("aws:s3:BucketPolicy", "bucket-policy")
            .with_attribute("bucket", bucket.id())
            .with_attribute("policy", document.to_value())
            .depends_on(public_access_block),
    )
}

/// Resources the backend pipeline deploys to
#[derive(Debug, Clone, Copy)]
pub struct BackendTargets<'a> {
    pub repository: &'a Handle,
    pub cluster: &'a Handle,
    pub execution_role: Option<&'a Handle>,
    pub task_role: Option<&'a Handle>,
}

/// Backend deploy permissions: push images, roll the service, pass roles
pub fn backend_policy_document(targets: BackendTargets<'_>) -> Result<PolicyDocument, GraphError> {
    let execution_role = arn_of(targets.execution_role, "task execution role")?;
    let task_role = arn_of(targets.task_role, "task role")?;

    Ok(PolicyDocument::new([
        Statement::allow()
            .actions(ECR_PUSH_ACTIONS)
            .resources([targets.repository.attr("repository.arn")]),
        Statement::allow()
            .actions(["ecs:DescribeServices", "ecs:UpdateService"])
            .resources(["*"])
            .condition(Condition::arn_equals(
                "ecs:cluster",
                [targets.cluster.arn()],
            )),
        Statement::allow()
            .actions(UNSCOPED_DEPLOY_ACTIONS)
            .resources(["*"]),
        Statement::allow()
            .actions(["iam:PassRole", "sts:AssumeRole"])
            .resources([execution_role, task_role]),
    ]))
}

pub fn compose_backend_pipeline_user(
    stack: &mut Stack,
    ctx: &ProviderContext,
    targets: BackendTargets<'_>,
) -> Result<PipelineUser, GraphError> {
    let document = backend_policy_document(targets)?;
    let name = format!("{}-BE-Pipeline", pipeline_prefix(stack));
    compose_pipeline_user(stack, ctx, &name, &document)
}
