use super::{GenAiExecutor, ARGOCD_AUTH_PROVIDER, GENAI_AUTH_PROVIDER, SLACK_SUPPORT_KEY};
use crate::analysis::{AnalysisClient, Analyzer, ApplicationSource, ArgoCdClient};
use crate::crds::{AuthEndpoint, AuthProvider, ConfigMapRef, NamespacedObjectReference, WorkflowSpec};
use crate::diagnostics::DiagnosticSource;
use crate::workflows::{Executor, ExecutorFactory, WorkflowError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Endpoint and secret resolved from one `AuthProvider`
struct Credential {
    endpoint: AuthEndpoint,
    secret: String,
}

/// Builds `GenAiExecutor`s, resolving credentials and support metadata
/// from the cluster
#[derive(Clone)]
pub struct GenAiExecutorFactory {
    client: Client,
    diagnostics: Arc<dyn DiagnosticSource>,
    timeout: Duration,
}

impl GenAiExecutorFactory {
    #[must_use]
    pub fn new(client: Client, diagnostics: Arc<dyn DiagnosticSource>, timeout: Duration) -> Self {
        Self {
            client,
            diagnostics,
            timeout,
        }
    }

    async fn resolve_credential(
        &self,
        reference: &NamespacedObjectReference,
        namespace: &str,
    ) -> Result<Credential, WorkflowError> {
        let namespace = reference.namespace.as_deref().unwrap_or(namespace);

        let providers: Api<AuthProvider> = Api::namespaced(self.client.clone(), namespace);
        let provider = providers.get_opt(&reference.name).await?.ok_or_else(|| {
            WorkflowError::AuthProviderNotFound {
                namespace: namespace.to_string(),
                name: reference.name.clone(),
            }
        })?;

        let secret_ref = &provider.spec.secret_ref;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get_opt(&secret_ref.name).await?.ok_or_else(|| {
            WorkflowError::SecretNotFound {
                namespace: namespace.to_string(),
                name: secret_ref.name.clone(),
            }
        })?;

        Ok(Credential {
            endpoint: provider.spec.auth.clone(),
            secret: secret_value(&secret, &secret_ref.key)?,
        })
    }

    async fn slack_channel(
        &self,
        config_map: &ConfigMapRef,
        namespace: &str,
    ) -> Result<String, WorkflowError> {
        if config_map.name.is_empty() {
            return Ok(String::new());
        }

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = config_maps.get_opt(&config_map.name).await?.ok_or_else(|| {
            WorkflowError::ConfigMapNotFound {
                namespace: namespace.to_string(),
                name: config_map.name.clone(),
            }
        })?;

        Ok(slack_support(&config_map))
    }
}

#[async_trait]
impl ExecutorFactory for GenAiExecutorFactory {
    #[instrument(skip(self, workflow), fields(workflow = %workflow.name, namespace = %namespace))]
    async fn build(
        &self,
        workflow: &WorkflowSpec,
        namespace: &str,
    ) -> Result<Box<dyn Executor>, WorkflowError> {
        let mut analyzer: Option<Arc<dyn Analyzer>> = None;
        let mut applications: Option<Arc<dyn ApplicationSource>> = None;

        for reference in &workflow.auth_provider_ref {
            let credential = self.resolve_credential(reference, namespace).await?;
            match reference.name.as_str() {
                GENAI_AUTH_PROVIDER => {
                    analyzer = Some(Arc::new(AnalysisClient::new(
                        &credential.endpoint.base_url,
                        credential.endpoint.api_version.as_deref(),
                        credential.secret,
                        self.timeout,
                    )?));
                }
                ARGOCD_AUTH_PROVIDER => {
                    applications = Some(Arc::new(ArgoCdClient::new(
                        &credential.endpoint.base_url,
                        credential.secret,
                        self.timeout,
                    )?));
                }
                other => debug!(auth_provider = %other, "AuthProvider not used by gen-ai"),
            }
        }

        let analyzer = analyzer
            .ok_or_else(|| WorkflowError::MissingAuthProvider(GENAI_AUTH_PROVIDER.to_string()))?;
        let slack_channel = self.slack_channel(&workflow.config_map_ref, namespace).await?;

        Ok(Box::new(
            GenAiExecutor::new(workflow.name.clone(), analyzer, self.diagnostics.clone())
                .with_applications(applications)
                .with_slack_channel(slack_channel),
        ))
    }
}

/// Trimmed, non-empty value of `key` in the secret
fn secret_value(secret: &Secret, key: &str) -> Result<String, WorkflowError> {
    let from_data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok());
    let from_string_data = || {
        secret
            .string_data
            .as_ref()
            .and_then(|data| data.get(key))
            .cloned()
    };

    from_data
        .or_else(from_string_data)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| WorkflowError::SecretKeyMissing {
            name: secret.name_any(),
            key: key.to_string(),
        })
}

fn slack_support(config_map: &ConfigMap) -> String {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(SLACK_SUPPORT_KEY))
        .cloned()
        .unwrap_or_default()
}
