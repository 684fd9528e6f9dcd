//! `AuthProvider` Custom Resource Definition for remote service credentials

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default secret key holding the credential
fn default_secret_key() -> String {
    "app.secret".to_string()
}

/// Endpoint coordinates of the remote service
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthEndpoint {
    /// Base URL of the service (e.g. `https://genai.example.com`)
    pub base_url: String,

    /// Optional API version path segment inserted after the base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Secret holding the credential for the service
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct SecretKeyRef {
    /// Name of the secret, in the `AuthProvider` namespace
    pub name: String,

    /// Key within the secret
    #[serde(default = "default_secret_key")]
    pub key: String,
}

/// `AuthProvider` CRD: where a remote service lives and how to authenticate
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "support.argoproj.extensions.io",
    version = "v1alpha1",
    kind = "AuthProvider",
    plural = "authproviders"
)]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.provider"}"#)]
#[kube(printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.auth.baseUrl"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderSpec {
    /// Provider flavour, informational (e.g. "genstudio", "argocd")
    #[serde(default)]
    pub provider: String,

    pub auth: AuthEndpoint,

    pub secret_ref: SecretKeyRef,
}
