//! Demonstration veto policies built from configuration.
//!
//! Each configured field of [`HookPolicyConfig`] enables one intervention.
//! Policies hold no state between events.

use tracing::debug;

use crate::config::HookPolicyConfig;
use crate::hooks::{EmissionVerdict, HookSet, Intervention, Verdict};

/// Build the hook set described by `config`.
pub fn policy_hooks(config: &HookPolicyConfig) -> HookSet {
    let mut hooks = HookSet::new();

    if let Some(limit) = config.max_final_partons {
        hooks.insert(Intervention::PartonLevel(Box::new(move |view| {
            let partons = view
                .record
                .final_state()
                .filter(|(_, particle)| particle.is_parton())
                .count();
            if partons > limit {
                debug!(partons, limit, "too many final partons");
                Verdict::Abort
            } else {
                Verdict::Continue
            }
        })));
    }

    if let Some(scale) = config.threshold_scale {
        let required = config.min_commits_above;
        hooks.insert(Intervention::ScaleThreshold {
            scale,
            handler: Box::new(move |_, context| {
                if context.commits < required {
                    Verdict::Abort
                } else {
                    Verdict::Continue
                }
            }),
        });
    }

    if let Some(min_fraction) = config.min_emission_fraction {
        hooks.insert(Intervention::OutgoingEmission(Box::new(move |view, context| {
            // Outgoing commits append the radiator daughter, then the emission.
            let mut appended = context.appended.iter().filter_map(|index| view.record.get(*index));
            let (Some(radiator), Some(emission)) = (appended.next(), appended.next()) else {
                return EmissionVerdict::Keep;
            };
            let total = radiator.momentum.e + emission.momentum.e;
            if total > 0.0 && emission.momentum.e / total < min_fraction {
                EmissionVerdict::Reject
            } else {
                EmissionVerdict::Keep
            }
        })));
    }

    if let Some(scale) = config.resonance_scale {
        hooks.insert(Intervention::ResonanceScale(Box::new(move |_, _| scale)));
    }

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use interleave_types::HookPoint;

    #[test]
    fn empty_config_enables_nothing() {
        let hooks = policy_hooks(&HookPolicyConfig::default());
        assert!(hooks.enabled_points().is_empty());
    }

    #[test]
    fn each_field_enables_its_point() {
        let config = HookPolicyConfig {
            max_final_partons: Some(40),
            threshold_scale: Some(30.0),
            min_commits_above: 1,
            min_emission_fraction: Some(0.05),
            resonance_scale: Some(45.0),
        };
        let hooks = policy_hooks(&config);
        assert_eq!(
            hooks.enabled_points(),
            vec![
                HookPoint::PartonLevel,
                HookPoint::ScaleThreshold,
                HookPoint::OutgoingEmission,
                HookPoint::ResonanceScale
            ]
        );
        assert!(hooks.threshold_scale().is_some_and(|s| (s - 30.0).abs() < f64::EPSILON));
    }
}
