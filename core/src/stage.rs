use std::fmt;

use crate::step::Step;

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    // Defaults to "<name> completed".
    pub banner: Option<String>,
    pub steps: Vec<Step>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            banner: None,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            banner: None,
            steps,
        }
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn banner_text(&self) -> String {
        self.banner
            .clone()
            .unwrap_or_else(|| format!("{} completed", self.name))
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_builder() {
        let stage = Stage::new("Time zone")
            .step(Step::program("Set zone", "timedatectl", vec![]))
            .step(Step::program("Sync clock", "hwclock", vec![]));

        assert_eq!(stage.len(), 2);
        assert!(!stage.is_empty());
        assert_eq!(stage.steps[1].description, "Sync clock");
        assert_eq!(format!("{}", stage), "Time zone");
    }

    #[test]
    fn test_banner_text() {
        let stage = Stage::with_steps("Kerberos", vec![]);
        assert!(stage.is_empty());
        assert_eq!(stage.banner_text(), "Kerberos completed");
        assert_eq!(
            stage.with_banner("Kerberos configured").banner_text(),
            "Kerberos configured"
        );
    }
}
