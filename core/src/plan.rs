use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::actions::{self, ActionContext};
use crate::config::{Config, StageConfig, StepConfig};
use crate::error::PlanError;
use crate::stage::Stage;
use crate::step::Step;

pub type Variables = HashMap<String, String>;

pub struct PlanContext {
    pub vars: Variables,
    pub proxy_available: bool,
    pub default_timeout: Duration,
    pub actions: ActionContext,
}

pub fn parse_var(raw: &str) -> Result<(String, String), PlanError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| PlanError::InvalidVariable(raw.to_string()))?;

    let name = name.trim();
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(PlanError::InvalidVariable(raw.to_string()));
    }

    Ok((name.to_string(), value.to_string()))
}

/// Built-ins first, then `[vars]`, then command-line overrides.
/// `proxy_available` and `active_proxy` always reflect the probe.
pub fn variables(config: &Config, overrides: &[(String, String)], proxy_available: bool) -> Variables {
    let mut vars = Variables::new();

    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let proxy = config.proxy.server.clone().unwrap_or_default();

    vars.insert("user".to_string(), user);
    vars.insert("proxy".to_string(), proxy.clone());

    vars.extend(config.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars.extend(overrides.iter().cloned());

    let active_proxy = if proxy_available { proxy } else { String::new() };
    vars.insert("proxy_available".to_string(), proxy_available.to_string());
    vars.insert("active_proxy".to_string(), active_proxy);

    vars
}

/// Substitutes `${name}` and `$name` from `vars`. Unknown names are left
/// untouched so inner shell variables survive.
pub fn expand(input: &str, vars: &Variables) -> String {
    shellexpand::env_with_context_no_errors(input, |name: &str| vars.get(name)).into_owned()
}

pub fn build(config: &Config, ctx: &PlanContext) -> Result<Vec<Stage>, PlanError> {
    config
        .stages
        .iter()
        .map(|stage| build_stage(stage, ctx))
        .collect()
}

fn build_stage(config: &StageConfig, ctx: &PlanContext) -> Result<Stage, PlanError> {
    let stage_timeout = config
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(ctx.default_timeout);

    let mut steps = Vec::with_capacity(config.steps.len());

    for step in &config.steps {
        if let Some(wanted) = step.when_proxy {
            if wanted != ctx.proxy_available {
                debug!(step = %step.description, wanted, "skipping step for proxy state");
                continue;
            }
        }

        steps.push(build_step(step, stage_timeout, ctx)?);
    }

    let mut stage = Stage::with_steps(expand(&config.name, &ctx.vars), steps);
    if let Some(banner) = &config.banner {
        stage = stage.with_banner(expand(banner, &ctx.vars));
    }

    Ok(stage)
}

fn build_step(config: &StepConfig, stage_timeout: Duration, ctx: &PlanContext) -> Result<Step, PlanError> {
    let description = expand(&config.description, &ctx.vars);
    let args: Vec<String> = config.args.iter().map(|arg| expand(arg, &ctx.vars)).collect();

    let step = match (&config.program, &config.action) {
        (Some(program), None) => Step::program(description, expand(program, &ctx.vars), args),
        (None, Some(action)) => {
            let func = actions::resolve(action, &ctx.actions).ok_or_else(|| PlanError::UnknownAction {
                step: description.clone(),
                action: action.clone(),
            })?;
            Step::from_fn(description, action.clone(), args, func)
        }
        _ => return Err(PlanError::MissingTarget { step: description }),
    };

    let timeout = config
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(stage_timeout);

    Ok(step.ignore_errors(config.ignore_errors).with_timeout(timeout))
}
