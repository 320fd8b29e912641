/// Pattern engine seam and reproducibility seeds.
///
/// Material assignment lives outside the core pipeline. The core only hands a
/// skeleton grid and, for stochastic patterns, a seed to whatever implements
/// [`PatternEngine`].
use crate::block::{Block, Material};
use crate::clock::Clock;
use crate::error::PatternError;
use crate::params::GridParameters;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Captured entropy that makes a stochastic material assignment replayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproducibilitySeed {
    pub time_component: i64,
    pub random_component: u64,
    /// Set when the seed was restored from a gallery entry for replay.
    #[serde(default)]
    pub from_gallery: bool,
}

impl ReproducibilitySeed {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self {
            time_component: clock.now_ms(),
            random_component: rand::random(),
            from_gallery: false,
        }
    }

    pub fn for_replay(self) -> Self {
        Self {
            from_gallery: true,
            ..self
        }
    }

    /// Single RNG seed folded from both components.
    pub fn rng_seed(&self) -> u64 {
        (self.time_component as u64).rotate_left(32) ^ self.random_component
    }
}

pub trait PatternEngine: Send + Sync {
    /// Assigns material to every block in place. `seed` is present whenever
    /// the pattern is seeded.
    fn apply(
        &self,
        params: &GridParameters,
        blocks: &mut [Block],
        seed: Option<&ReproducibilitySeed>,
    ) -> Result<(), PatternError>;
}

/// Minimal engine: horizontal strata with a grade shell around the model
/// centre. Seeded patterns add per-cell noise drawn from the seed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StratifiedPatternEngine;

impl PatternEngine for StratifiedPatternEngine {
    fn apply(
        &self,
        params: &GridParameters,
        blocks: &mut [Block],
        seed: Option<&ReproducibilitySeed>,
    ) -> Result<(), PatternError> {
        let pattern = params.pattern();
        let mut rng = match (pattern.is_seeded(), seed) {
            (true, Some(seed)) => Some(StdRng::seed_from_u64(seed.rng_seed())),
            (true, None) => {
                return Err(PatternError(format!(
                    "pattern '{}' needs a reproducibility seed",
                    pattern
                )));
            }
            (false, _) => None,
        };

        let counts = params.counts();
        let centre = [
            counts.x as f64 / 2.0,
            counts.y as f64 / 2.0,
            counts.z as f64 / 2.0,
        ];
        let radius = centre[0].min(centre[1]).min(centre[2]).max(1.0);

        for block in blocks.iter_mut() {
            let idx = block.index;

            // Surface relief: a sparse set of top cells stay empty.
            if idx.k == 0 && (idx.i + idx.j) % 5 == 0 {
                block.material = Some(Material::air());
                continue;
            }

            let depth = (idx.k as f64 + 0.5) / counts.z as f64;
            let (rock, density) = match depth {
                d if d < 0.1 => ("overburden", 1.9),
                d if d < 0.35 => ("oxide", 2.4),
                d if d < 0.7 => ("sulphide", 2.8),
                _ => ("basement", 2.9),
            };

            let dx = idx.i as f64 + 0.5 - centre[0];
            let dy = idx.j as f64 + 0.5 - centre[1];
            let dz = idx.k as f64 + 0.5 - centre[2];
            let distance = (dx * dx + dy * dy + dz * dz).sqrt() / radius;
            let noise = rng.as_mut().map_or(1.0, |r| r.gen_range(0.6..1.4));
            let shell = (1.0 - distance).max(0.0) * noise;

            let mut material = Material::rock(rock, density);
            if shell > 0.0 {
                let cu = (shell * 1.5 * 100.0).round() / 100.0;
                let au = (shell * 2.0 * 100.0).round() / 100.0;
                material.zone = Some(if shell > 0.5 { "core" } else { "halo" }.to_string());
                material.cu_grade = Some(cu);
                material.au_grade = Some(au);
                material.value = Some((cu * 65.0 + au * 55.0) * density);
            }
            block.material = Some(material);
        }
        Ok(())
    }
}
