//! End-to-end `report-image` flow.
//!
//! [`ReportPlan::prepare`] does every check that needs no network: required
//! inputs, provider configuration and credential selection. Only a plan that
//! passed all of them reaches [`ReportingPipeline::run`], which then talks to
//! STS, the registry, the git provider and the catalog, strictly in that order.

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::catalog::{CatalogReporter, ImageBinaryInput, ImageRegistryInput};
use crate::error::ReporterError;
use crate::git::{self, CommitContext, GitProvider};
use crate::registry::{
    credentials, inspect, CredentialVariant, ImageManifest, RegistryFactory, RoleAssumer,
};
use crate::settings::{Environment, ReportSettings};
use crate::validation;

/// Where the commit details attached to an image come from
#[async_trait]
pub trait CommitSource: Send + Sync {
    fn describe(&self) -> String;

    async fn commit_context(&self) -> Result<CommitContext, ReporterError>;
}

/// Commit details passed in by the CI platform as `GIT_*` variables
pub struct EnvCommitSource {
    context: CommitContext,
}

impl EnvCommitSource {
    pub fn from_env(env: &Environment) -> Self {
        Self {
            context: CommitContext::from_env(env),
        }
    }
}

#[async_trait]
impl CommitSource for EnvCommitSource {
    fn describe(&self) -> String {
        "environment".to_string()
    }

    async fn commit_context(&self) -> Result<CommitContext, ReporterError> {
        Ok(self.context.clone())
    }
}

/// Commit details looked up from the configured git provider
pub struct ProviderCommitSource {
    provider: GitProvider,
    repo: String,
    branch: String,
    revision: Option<String>,
}

impl ProviderCommitSource {
    /// Validate the provider configuration and select its client. No I/O.
    pub fn from_env(env: &Environment, http: &reqwest::Client) -> Result<Self, ReporterError> {
        let config = validation::validate(env)?;
        let provider = git::select(&config.provider, &config, http)?;
        debug!(
            "Git provider {} for {} ({}), runtime {}, commits-by-user limit {}",
            config.provider,
            config.image_name,
            config.image_digest,
            config.cf_runtime.as_deref().unwrap_or("default"),
            config.commits_by_user_limit
        );

        Ok(Self {
            provider,
            repo: config.repo,
            branch: config.branch,
            revision: config.revision,
        })
    }
}

#[async_trait]
impl CommitSource for ProviderCommitSource {
    fn describe(&self) -> String {
        format!("{} provider", self.provider.kind())
    }

    async fn commit_context(&self) -> Result<CommitContext, ReporterError> {
        self.provider
            .fetch_commit_context(&self.repo, &self.branch, self.revision.as_deref())
            .await
    }
}

/// Pick the commit source: the git provider when `GIT_PROVIDER` is set,
/// the `GIT_*` variables otherwise.
pub fn commit_source(
    env: &Environment,
    http: &reqwest::Client,
) -> Result<Box<dyn CommitSource>, ReporterError> {
    if env.contains("GIT_PROVIDER") {
        Ok(Box::new(ProviderCommitSource::from_env(env, http)?))
    } else {
        Ok(Box::new(EnvCommitSource::from_env(env)))
    }
}

/// A reporting run that passed every offline check
pub struct ReportPlan {
    pub settings: ReportSettings,
    pub credentials: CredentialVariant,
    pub commits: Box<dyn CommitSource>,
}

impl ReportPlan {
    pub fn prepare(env: &Environment, http: &reqwest::Client) -> Result<Self, ReporterError> {
        let settings = ReportSettings::from_env(env)?;
        let commits = commit_source(env, http)?;
        let credentials = credentials::select_credentials(env)?;

        info!(
            "Reporting {} with {} credentials, commit details from {}",
            settings.image_uri,
            credentials.kind(),
            commits.describe()
        );

        Ok(Self {
            settings,
            credentials,
            commits,
        })
    }
}

/// What a successful run wrote to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub binary_id: String,
    pub manifest: ImageManifest,
}

pub struct ReportingPipeline<'a> {
    assumer: &'a dyn RoleAssumer,
    registries: &'a dyn RegistryFactory,
    catalog: &'a dyn CatalogReporter,
}

impl<'a> ReportingPipeline<'a> {
    pub fn new(
        assumer: &'a dyn RoleAssumer,
        registries: &'a dyn RegistryFactory,
        catalog: &'a dyn CatalogReporter,
    ) -> Self {
        Self {
            assumer,
            registries,
            catalog,
        }
    }

    pub async fn run(&self, plan: ReportPlan) -> Result<ReportOutcome, ReporterError> {
        let ReportPlan {
            settings,
            credentials: variant,
            commits,
        } = plan;

        let resolved = credentials::resolve(variant, self.assumer).await?;
        let client = self.registries.build(resolved).await?;
        let manifest = inspect(client.as_ref(), &settings.image_uri).await?;

        let commit = commits.commit_context().await?;

        let binary = ImageBinaryInput::new(
            &settings.image_uri,
            &manifest,
            commit,
            settings.workflow_name.clone(),
        );
        let binary_id = self.catalog.report_image_binary(&binary).await?;

        let registry = ImageRegistryInput::new(binary_id.clone(), &settings.image_uri, &manifest);
        if let Err(e) = self.catalog.report_image_registry(&registry).await {
            // The binary record stays behind; nothing deletes it
            error!(
                "Image binary {} was created but its registry record failed",
                binary_id
            );
            return Err(e);
        }

        info!(
            "Reported {} ({} bytes) as binary {}",
            settings.image_uri, manifest.total_size_bytes, binary_id
        );
        Ok(ReportOutcome {
            binary_id,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::provider_env;
    use crate::registry::credentials::tests::RecordingAssumer;
    use crate::registry::inspector::tests::FakeRegistry;
    use crate::registry::{
        ImageConfig, RegistryBackend, RegistryClient, RemoteManifest, ResolvedCredentials,
    };
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct SharedRegistry(Arc<FakeRegistry>);

    #[async_trait]
    impl RegistryClient for SharedRegistry {
        fn backend(&self) -> RegistryBackend {
            self.0.backend()
        }

        async fn fetch_manifest(&self, image: &str) -> Result<RemoteManifest, ReporterError> {
            self.0.fetch_manifest(image).await
        }

        async fn fetch_config(
            &self,
            image: &str,
            manifest: &RemoteManifest,
        ) -> Result<ImageConfig, ReporterError> {
            self.0.fetch_config(image, manifest).await
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        built: Mutex<Vec<ResolvedCredentials>>,
        registries: Mutex<Vec<Arc<FakeRegistry>>>,
    }

    #[async_trait]
    impl RegistryFactory for FakeFactory {
        async fn build(
            &self,
            credentials: ResolvedCredentials,
        ) -> Result<Box<dyn RegistryClient>, ReporterError> {
            let backend = match &credentials {
                ResolvedCredentials::Dockerhub { .. } => RegistryBackend::Dockerhub,
                ResolvedCredentials::Standard { .. } => RegistryBackend::Standard,
                ResolvedCredentials::Ecr { .. } => RegistryBackend::Ecr,
                ResolvedCredentials::Gcr { .. } => RegistryBackend::Gcr,
            };
            self.built.lock().unwrap().push(credentials);
            let registry = Arc::new(FakeRegistry::new(backend));
            self.registries.lock().unwrap().push(registry.clone());
            Ok(Box::new(SharedRegistry(registry)))
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        binaries: Mutex<Vec<ImageBinaryInput>>,
        registries: Mutex<Vec<ImageRegistryInput>>,
        fail_registry: bool,
    }

    #[async_trait]
    impl CatalogReporter for FakeCatalog {
        async fn report_image_binary(
            &self,
            binary: &ImageBinaryInput,
        ) -> Result<String, ReporterError> {
            self.binaries.lock().unwrap().push(binary.clone());
            Ok("bin-1".to_string())
        }

        async fn report_image_registry(
            &self,
            registry: &ImageRegistryInput,
        ) -> Result<(), ReporterError> {
            if self.fail_registry {
                return Err(ReporterError::network("createImageRegistry", "HTTP 500"));
            }
            self.registries.lock().unwrap().push(registry.clone());
            Ok(())
        }
    }

    fn report_env(extra: &[(&'static str, &'static str)]) -> Environment {
        let mut pairs = vec![
            ("IMAGE_URI", "acme/app:1.0"),
            ("CF_HOST", "https://g.codefresh.io"),
            ("CF_API_KEY", "api-key"),
            ("WORKFLOW_NAME", "build-and-push"),
            ("GIT_BRANCH", "main"),
            ("GIT_REVISION", "abc123"),
            ("GIT_COMMIT_MESSAGE", "Fix build"),
            ("GIT_SENDER_LOGIN", "octocat"),
        ];
        pairs.extend_from_slice(extra);
        Environment::from_pairs(pairs)
    }

    /// Provider environment plus what `report-image` needs on top of it
    fn with_report_inputs(provider: Environment, extra: &[(&str, &str)]) -> Environment {
        let mut pairs: Vec<(String, String)> = [
            "GIT_PROVIDER",
            "CF_API_KEY",
            "IMAGE_NAME",
            "IMAGE_SHA",
            "REPO",
            "BRANCH",
            "GITHUB_TOKEN",
            "BITBUCKET_SERVER_HOST_URL",
        ]
        .into_iter()
        .filter_map(|key| provider.get(key).map(|v| (key.to_string(), v.to_string())))
        .collect();
        let mut inputs: Vec<(&str, &str)> = vec![
            ("IMAGE_URI", "acme/app:1.0"),
            ("CF_HOST", "https://g.codefresh.io"),
            ("DOCKER_USERNAME", "u"),
            ("DOCKER_PASSWORD", "p"),
        ];
        inputs.extend_from_slice(extra);
        pairs.extend(
            inputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        Environment::from_pairs(pairs)
    }

    #[tokio::test]
    async fn test_dockerhub_run_uses_only_dockerhub() {
        let env = report_env(&[
            ("DOCKER_USERNAME", "docker-user"),
            ("DOCKER_PASSWORD", "docker-pass"),
            ("AWS_ROLE", "arn:aws:iam::123456789012:role/reporter"),
            ("AWS_REGION", "eu-west-1"),
            ("GCR_KEY_FILE_PATH", "/secrets/gcr.json"),
        ]);
        let assumer = RecordingAssumer::default();
        let factory = FakeFactory::default();
        let catalog = FakeCatalog::default();

        let plan = ReportPlan::prepare(&env, &reqwest::Client::new()).unwrap();
        let outcome = ReportingPipeline::new(&assumer, &factory, &catalog)
            .run(plan)
            .await
            .unwrap();

        assert!(assumer.calls.lock().unwrap().is_empty());
        assert_eq!(
            *factory.built.lock().unwrap(),
            vec![ResolvedCredentials::Dockerhub {
                username: "docker-user".to_string(),
                password: "docker-pass".to_string(),
            }]
        );
        let registries = factory.registries.lock().unwrap();
        assert_eq!(
            *registries[0].requests.lock().unwrap(),
            vec![
                "manifest acme/app:1.0",
                "config acme/app:1.0 sha256:config"
            ]
        );
        assert_eq!(outcome.binary_id, "bin-1");
        assert_eq!(outcome.manifest.total_size_bytes, 2000);
    }

    #[tokio::test]
    async fn test_binary_and_registry_records() {
        let env = report_env(&[("DOCKER_USERNAME", "u"), ("DOCKER_PASSWORD", "p")]);
        let assumer = RecordingAssumer::default();
        let factory = FakeFactory::default();
        let catalog = FakeCatalog::default();

        let plan = ReportPlan::prepare(&env, &reqwest::Client::new()).unwrap();
        ReportingPipeline::new(&assumer, &factory, &catalog)
            .run(plan)
            .await
            .unwrap();

        let binaries = catalog.binaries.lock().unwrap();
        assert_eq!(binaries.len(), 1);
        let binary = &binaries[0];
        assert_eq!(binary.id, "sha256:config");
        assert_eq!(binary.image_name, "acme/app:1.0");
        assert_eq!(binary.size, 2000);
        assert_eq!(binary.branch.as_deref(), Some("main"));
        assert_eq!(binary.commit.as_deref(), Some("abc123"));
        assert_eq!(binary.commit_msg.as_deref(), Some("Fix build"));
        assert_eq!(binary.workflow_name.as_deref(), Some("build-and-push"));
        assert_eq!(binary.author.username.as_deref(), Some("octocat"));

        assert_eq!(
            *catalog.registries.lock().unwrap(),
            vec![ImageRegistryInput {
                binary_id: "bin-1".to_string(),
                image_name: "acme/app:1.0".to_string(),
                repo_digest: "acme/app@sha256:manifest".to_string(),
                created: Some("2024-05-01T10:00:00Z".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_assumed_role_calls_sts_once_before_build() {
        let env = report_env(&[
            ("AWS_ROLE", "arn:aws:iam::123456789012:role/reporter"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY", "AKIASTATIC"),
            ("AWS_SECRET_KEY", "static-secret"),
        ]);
        let assumer = RecordingAssumer::default();
        let factory = FakeFactory::default();
        let catalog = FakeCatalog::default();

        let plan = ReportPlan::prepare(&env, &reqwest::Client::new()).unwrap();
        ReportingPipeline::new(&assumer, &factory, &catalog)
            .run(plan)
            .await
            .unwrap();

        assert_eq!(
            *assumer.calls.lock().unwrap(),
            vec![(
                "arn:aws:iam::123456789012:role/reporter".to_string(),
                "eu-west-1".to_string()
            )]
        );
        // The client was built from the STS session, not the static keys
        assert_eq!(
            *factory.built.lock().unwrap(),
            vec![ResolvedCredentials::Ecr {
                region: "eu-west-1".to_string(),
                access_key_id: "ASIATEMP".to_string(),
                secret_access_key: "temp-secret".to_string(),
                session_token: Some("temp-token".to_string()),
            }]
        );
    }

    #[test]
    fn test_prepare_requires_report_inputs() {
        let env = Environment::from_pairs([("DOCKER_USERNAME", "u"), ("DOCKER_PASSWORD", "p")]);
        match ReportPlan::prepare(&env, &reqwest::Client::new()) {
            Err(ReporterError::MissingRequiredInput(names)) => {
                assert_eq!(names, vec!["IMAGE_URI", "CF_API_KEY", "CF_HOST"])
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("plan should not be prepared"),
        }
    }

    #[test]
    fn test_prepare_without_credentials() {
        let env = report_env(&[("DOCKER_USERNAME", "cf-not-exist"), ("DOCKER_PASSWORD", "p")]);
        assert!(matches!(
            ReportPlan::prepare(&env, &reqwest::Client::new()),
            Err(ReporterError::NoCredentials)
        ));
    }

    #[test]
    fn test_invalid_provider_config_fails_before_any_network_call() {
        let env = report_env(&[
            ("GIT_PROVIDER", "github"),
            ("GITHUB_TOKEN", "t"),
            ("GITHUB_CONTEXT", "ctx"),
            ("AWS_ROLE", "arn:aws:iam::123456789012:role/reporter"),
            ("AWS_REGION", "eu-west-1"),
        ]);
        match ReportPlan::prepare(&env, &reqwest::Client::new()) {
            Err(ReporterError::Validation(e)) => {
                assert!(e.fields().contains(&"GITHUB_CONTEXT"));
                assert!(e.fields().contains(&"IMAGE_NAME"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("plan should not be prepared"),
        }
    }

    #[test]
    fn test_unsupported_provider_fails_preparation() {
        let env = with_report_inputs(provider_env("azure-devops"), &[]);
        assert!(matches!(
            ReportPlan::prepare(&env, &reqwest::Client::new()),
            Err(ReporterError::UnsupportedProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_registry_failure_keeps_binary_and_fails_run() {
        let env = report_env(&[("DOCKER_USERNAME", "u"), ("DOCKER_PASSWORD", "p")]);
        let assumer = RecordingAssumer::default();
        let factory = FakeFactory::default();
        let catalog = FakeCatalog {
            fail_registry: true,
            ..Default::default()
        };

        let plan = ReportPlan::prepare(&env, &reqwest::Client::new()).unwrap();
        let err = ReportingPipeline::new(&assumer, &factory, &catalog)
            .run(plan)
            .await
            .unwrap_err();

        assert!(matches!(err, ReporterError::Network { .. }));
        assert_eq!(catalog.binaries.lock().unwrap().len(), 1);
        assert!(catalog.registries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_commit_context_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/app/commits/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sha": "def456",
                "html_url": "https://github.com/acme/app/commit/def456",
                "commit": { "message": "From provider" },
                "author": { "login": "hubot" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api_host = server.uri();
        let env = with_report_inputs(
            provider_env("github"),
            &[("GITHUB_API_HOST_URL", api_host.as_str())],
        );

        let assumer = RecordingAssumer::default();
        let factory = FakeFactory::default();
        let catalog = FakeCatalog::default();

        let plan = ReportPlan::prepare(&env, &reqwest::Client::new()).unwrap();
        assert_eq!(plan.commits.describe(), "github provider");
        ReportingPipeline::new(&assumer, &factory, &catalog)
            .run(plan)
            .await
            .unwrap();

        let binaries = catalog.binaries.lock().unwrap();
        assert_eq!(binaries[0].commit.as_deref(), Some("def456"));
        assert_eq!(binaries[0].branch.as_deref(), Some("main"));
        assert_eq!(binaries[0].commit_msg.as_deref(), Some("From provider"));
        assert_eq!(binaries[0].author.username.as_deref(), Some("hubot"));
    }
}
