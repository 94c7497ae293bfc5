//! IAM roles and customer-managed policies

use super::{KindService, compact, policy_document, string_map, text};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::{classify_sdk_error, to_fetch_error};
use anyhow::{Context, Result};
use aws_sdk_iam::types::PolicyScopeType;
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Value, json};
use tracing::debug;

/// ARN of a customer-managed policy at the root path
pub(crate) fn root_policy_arn(identity: &Identity, name: &str) -> String {
    format!("arn:aws:iam::{}:policy/{name}", identity.account_id)
}

/// Lists roles and fetches their trust policy and attached/inline policies
pub struct IamRoleService {
    client: aws_sdk_iam::Client,
}

impl FromAwsContext for IamRoleService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }
}

impl IamRoleService {
    async fn attached_policies(&self, name: &str) -> Result<Vec<Value>, FetchError> {
        let mut policies = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_attached_role_policies()
                .role_name(name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| to_fetch_error(name, "ListAttachedRolePolicies", e))?;

            for policy in resp.attached_policies() {
                policies.push(json!({
                    "PolicyName": policy.policy_name(),
                    "PolicyArn": policy.policy_arn(),
                }));
            }

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(policies)
    }

    async fn inline_policies(&self, name: &str) -> Result<Vec<String>, FetchError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_role_policies()
                .role_name(name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| to_fetch_error(name, "ListRolePolicies", e))?;

            names.extend(resp.policy_names().iter().cloned());

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(names)
    }
}

impl KindService for IamRoleService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list IAM roles")?;

            let names: Vec<String> = resp
                .roles()
                .iter()
                .filter_map(|role| text(role.role_name()))
                .map(str::to_string)
                .collect();
            pages.publish(names).await?;

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn describe(
        &self,
        _identity: &Identity,
        name: &str,
    ) -> Result<Option<ResourceDetail>, FetchError> {
        let resp = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetRole", e))?;

        let Some(role) = resp.role() else {
            return Ok(None);
        };
        let attached = self.attached_policies(name).await?;
        let inline = self.inline_policies(name).await?;

        let tags = string_map(
            role.tags()
                .iter()
                .filter_map(|t| Some((text(t.key())?, text(t.value())?))),
        );
        let arn: Option<&str> = role.arn().into();

        let attributes = compact(json!({
            "RoleName": text(role.role_name()),
            "Path": text(role.path()),
            "Description": role.description(),
            "MaxSessionDuration": role.max_session_duration(),
            "AssumeRolePolicyDocument": role.assume_role_policy_document().map(policy_document),
            "PermissionsBoundary": role
                .permissions_boundary()
                .and_then(|b| b.permissions_boundary_arn()),
            "AttachedPolicies": attached,
            "InlinePolicies": inline,
            "Tags": tags,
            "RoleId": text(role.role_id()),
        }));

        let mut detail = ResourceDetail::new(ResourceKind::Role, name, attributes);
        if let Some(arn) = arn {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}

/// Lists customer-managed policies and fetches their default version
pub struct IamPolicyService {
    client: aws_sdk_iam::Client,
}

impl FromAwsContext for IamPolicyService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }
}

impl IamPolicyService {
    /// Resolve a policy name to its ARN.
    ///
    /// Policies created under a non-root path carry the path in their ARN,
    /// so a miss on the root-path ARN falls back to a local-scope listing.
    async fn resolve_arn(&self, identity: &Identity, name: &str) -> Result<Option<String>, FetchError> {
        let root_arn = root_policy_arn(identity, name);
        match self.client.get_policy().policy_arn(&root_arn).send().await {
            Ok(_) => return Ok(Some(root_arn)),
            Err(e) if classify_sdk_error(&e).is_not_found() => {
                debug!(policy = name, "Policy not at root path, searching local policies");
            }
            Err(e) => return Err(to_fetch_error(name, "GetPolicy", e)),
        }

        let mut marker: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_policies()
                .scope(PolicyScopeType::Local)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| to_fetch_error(name, "ListPolicies", e))?;

            let found = resp
                .policies()
                .iter()
                .find(|p| p.policy_name() == Some(name))
                .and_then(|p| p.arn());
            if let Some(arn) = found {
                return Ok(Some(arn.to_string()));
            }

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                return Ok(None);
            }
        }
    }
}

impl KindService for IamPolicyService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_policies()
                .scope(PolicyScopeType::Local)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list IAM policies")?;

            let names: Vec<String> = resp
                .policies()
                .iter()
                .filter_map(|p| p.policy_name())
                .map(str::to_string)
                .collect();
            pages.publish(names).await?;

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn describe(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<Option<ResourceDetail>, FetchError> {
        let Some(arn) = self.resolve_arn(identity, name).await? else {
            return Ok(None);
        };

        let resp = self
            .client
            .get_policy()
            .policy_arn(&arn)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetPolicy", e))?;
        let Some(policy) = resp.policy() else {
            return Ok(None);
        };

        let document = match policy.default_version_id() {
            Some(version_id) => {
                let version = self
                    .client
                    .get_policy_version()
                    .policy_arn(&arn)
                    .version_id(version_id)
                    .send()
                    .await
                    .map_err(|e| to_fetch_error(name, "GetPolicyVersion", e))?;
                version
                    .policy_version()
                    .and_then(|v| v.document())
                    .map(policy_document)
            }
            None => None,
        };

        let tags = string_map(
            policy
                .tags()
                .iter()
                .filter_map(|t| Some((text(t.key())?, text(t.value())?))),
        );

        let attributes = compact(json!({
            "PolicyName": policy.policy_name(),
            "Path": policy.path(),
            "Description": policy.description(),
            "IsAttachable": policy.is_attachable(),
            "PolicyDocument": document,
            "Tags": tags,
            "DefaultVersionId": policy.default_version_id(),
            "AttachmentCount": policy.attachment_count(),
            "PolicyId": policy.policy_id(),
        }));

        Ok(Some(
            ResourceDetail::new(ResourceKind::Policy, name, attributes).with_arn(arn),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::account::AccountId;

    #[test]
    fn test_root_policy_arn() {
        let identity = Identity::new(AccountId::new("111111111111"), "us-east-1");
        assert_eq!(
            root_policy_arn(&identity, "deploy"),
            "arn:aws:iam::111111111111:policy/deploy"
        );
    }
}
