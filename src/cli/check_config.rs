use crate::git::ProviderKind;
use crate::registry::select_credentials;
use crate::settings::{Environment, HttpPolicy, ReportSettings};
use crate::validation;

/// Outcome of an offline configuration check
#[derive(Debug, Default)]
pub struct ConfigCheck {
    pub notes: Vec<String>,
    pub problems: Vec<String>,
}

impl ConfigCheck {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Run every offline check `report-image` would run, without stopping at the
/// first failure. No STS exchange or other network call is made.
pub fn check(env: &Environment, timeout_secs: Option<u64>) -> ConfigCheck {
    let mut result = ConfigCheck::default();

    match HttpPolicy::resolve(env, timeout_secs) {
        Ok(policy) => match policy.timeout {
            Some(timeout) => result
                .notes
                .push(format!("HTTP timeout: {}s", timeout.as_secs())),
            None => result.notes.push("HTTP timeout: none".to_string()),
        },
        Err(e) => result
            .problems
            .extend(e.violations().iter().map(ToString::to_string)),
    }

    if let Err(e) = ReportSettings::from_env(env) {
        result.problems.push(e.to_string());
    }

    if env.contains("GIT_PROVIDER") {
        match validation::validate(env) {
            Ok(config) => match config.provider.parse::<ProviderKind>() {
                Ok(kind) => result
                    .notes
                    .push(format!("Commit details from the {} provider", kind)),
                Err(e) => result.problems.push(e.to_string()),
            },
            Err(e) => result
                .problems
                .extend(e.violations().iter().map(ToString::to_string)),
        }
    } else {
        result
            .notes
            .push("Commit details from GIT_* variables (GIT_PROVIDER not set)".to_string());
    }

    match select_credentials(env) {
        Ok(variant) => result
            .notes
            .push(format!("Registry credentials: {}", variant.kind())),
        Err(e) => result.problems.push(e.to_string()),
    }

    result
}

pub fn check_config(env: &Environment, timeout_secs: Option<u64>) {
    println!("Checking reporter configuration...");
    let result = check(env, timeout_secs);

    for note in &result.notes {
        println!("  {}", note);
    }

    if result.is_valid() {
        println!("✓ Configuration is valid");
    } else {
        for problem in &result.problems {
            eprintln!("✗ {}", problem);
        }
        std::process::exit(1);
    }
}
