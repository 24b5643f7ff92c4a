use log::debug;

use super::Barcode;
use super::LikelihoodModel;

///////////////////////////////
/// Outcome of one classification decision.
///
/// `option` is the registry index of the winner, or `None` for the
/// unclassified bucket. `distance` and `confidence` always describe the
/// would-be winner so low-confidence decisions remain auditable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Decoded {
    pub option: Option<usize>,
    pub distance: u32,
    pub confidence: f64,
    pub low_confidence: bool,
    pub low_conditional_confidence: bool,
}

/// A decoder policy for one classification site.
pub trait Decoder: Send + Sync {
    fn decode(&self, observed: &Barcode) -> Decoded;
    fn registry(&self) -> &[Barcode];
}

///////////////////////////////
/// Minimum-distance decoding: smallest aggregate distance that satisfies
/// every per-position tolerance wins. Ties and empty shortlists route to
/// unclassified. Quality only participates through the masking rule.
#[derive(Clone, Debug)]
pub struct MinDistanceDecoder {
    registry: Vec<Barcode>,
}

impl MinDistanceDecoder {
    pub fn new(registry: Vec<Barcode>) -> MinDistanceDecoder {
        MinDistanceDecoder { registry }
    }
}

impl Decoder for MinDistanceDecoder {
    fn decode(&self, observed: &Barcode) -> Decoded {
        let mut best: Option<(usize, u32)> = None;
        let mut tied = false;

        for (index, candidate) in self.registry.iter().enumerate() {
            let Some(d) = candidate.corrected_match(observed) else {
                continue;
            };
            match best {
                None => {
                    best = Some((index, d));
                    tied = false;
                }
                Some((_, best_d)) if d < best_d => {
                    best = Some((index, d));
                    tied = false;
                }
                Some((_, best_d)) if d == best_d => {
                    tied = true;
                }
                Some(_) => {}
            }
        }

        match best {
            Some((index, d)) if !tied => Decoded {
                option: Some(index),
                distance: d,
                confidence: 1.0,
                low_confidence: false,
                low_conditional_confidence: false,
            },
            Some((_, d)) => {
                debug!("ambiguous minimum-distance decode at distance {}", d);
                // tie: the distance to the (first) tied winner is still
                // reported for accounting
                Decoded {
                    option: None,
                    distance: d,
                    confidence: 0.0,
                    low_confidence: false,
                    low_conditional_confidence: false,
                }
            }
            None => Decoded {
                option: None,
                distance: 0,
                confidence: 0.0,
                low_confidence: false,
                low_conditional_confidence: false,
            },
        }
    }

    fn registry(&self) -> &[Barcode] {
        &self.registry
    }
}

///////////////////////////////
/// Posterior-probability decoding against all candidates plus a uniform
/// noise model.
///
/// The posterior of each candidate is `likelihood * prior` normalized over
/// every candidate and the noise term. A winner below `confidence_floor`, or
/// whose noise-excluded conditional posterior falls below
/// `conditional_confidence_floor`, is routed to unclassified; the two
/// conditions are tracked independently and may both fire on one record.
#[derive(Clone, Debug)]
pub struct ProbabilisticDecoder {
    registry: Vec<Barcode>,
    priors: Vec<f64>,
    noise_prior: f64,
    confidence_floor: f64,
    conditional_confidence_floor: f64,
    model: LikelihoodModel,
}

impl ProbabilisticDecoder {
    pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.95;
    pub const DEFAULT_CONDITIONAL_CONFIDENCE_FLOOR: f64 = 0.95;
    pub const DEFAULT_NOISE_PRIOR: f64 = 0.05;

    ///////////////////////////////
    /// Uniform candidate priors; floors and noise prior at their defaults.
    /// The registry must be non-empty; with no candidates there is no winner
    /// to take a posterior over.
    pub fn new(registry: Vec<Barcode>, model: LikelihoodModel) -> ProbabilisticDecoder {
        assert!(
            !registry.is_empty(),
            "probabilistic decoding requires at least one candidate"
        );
        let uniform = (1.0 - Self::DEFAULT_NOISE_PRIOR) / registry.len() as f64;
        ProbabilisticDecoder {
            priors: vec![uniform; registry.len()],
            registry,
            noise_prior: Self::DEFAULT_NOISE_PRIOR,
            confidence_floor: Self::DEFAULT_CONFIDENCE_FLOOR,
            conditional_confidence_floor: Self::DEFAULT_CONDITIONAL_CONFIDENCE_FLOOR,
            model,
        }
    }

    pub fn with_priors(mut self, priors: Vec<f64>, noise_prior: f64) -> ProbabilisticDecoder {
        assert_eq!(
            priors.len(),
            self.registry.len(),
            "one prior per registry entry"
        );
        self.priors = priors;
        self.noise_prior = noise_prior;
        self
    }

    pub fn with_floors(mut self, confidence: f64, conditional: f64) -> ProbabilisticDecoder {
        self.confidence_floor = confidence;
        self.conditional_confidence_floor = conditional;
        self
    }

    /// Likelihood of the observation under pure noise: uniform 1/4 per base.
    #[inline]
    fn noise_likelihood(&self, observed: &Barcode) -> f64 {
        0.25f64.powi(observed.total_length() as i32)
    }
}

impl Decoder for ProbabilisticDecoder {
    fn decode(&self, observed: &Barcode) -> Decoded {
        let mut winner = 0usize;
        let mut winner_mass = f64::MIN;
        let mut total_mass = 0.0f64;

        for (index, candidate) in self.registry.iter().enumerate() {
            let mass = candidate.likelihood(observed, self.model) * self.priors[index];
            total_mass += mass;
            // strict comparison keeps the lowest index on exact ties
            if mass > winner_mass {
                winner_mass = mass;
                winner = index;
            }
        }

        let noise_mass = self.noise_likelihood(observed) * self.noise_prior;
        let evidence = total_mass + noise_mass;

        let confidence = if evidence > 0.0 {
            winner_mass / evidence
        } else {
            0.0
        };
        let conditional_confidence = if total_mass > 0.0 {
            winner_mass / total_mass
        } else {
            0.0
        };

        let low_confidence = confidence < self.confidence_floor;
        let low_conditional_confidence = conditional_confidence < self.conditional_confidence_floor;

        Decoded {
            option: if low_confidence || low_conditional_confidence {
                None
            } else {
                Some(winner)
            },
            distance: self.registry[winner].distance(observed),
            confidence,
            low_confidence,
            low_conditional_confidence,
        }
    }

    fn registry(&self) -> &[Barcode] {
        &self.registry
    }
}
