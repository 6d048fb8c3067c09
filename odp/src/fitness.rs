// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! How well a decoded key matches what the decoder expected.

use std::fmt::{Display, Formatter};

/// Grade of a decoded flow key.
///
/// Variants are ordered from best to worst, so the grade of a key assembled from parts is the
/// [`Ord::max`] of the grades of the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Fitness {
    /// Every attribute was expected and every expected attribute was present.
    #[default]
    Perfect,
    /// Some attribute was unknown or not expected.
    TooMuch,
    /// Some expected attribute was missing.
    TooLittle,
    /// The key is malformed.
    Error,
}

impl Fitness {
    /// The name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Fitness::Perfect => "OK",
            Fitness::TooMuch => "too_much",
            Fitness::TooLittle => "too_little",
            Fitness::Error => "error",
        }
    }
}

/// Name of a fitness value.
#[must_use]
pub fn odp_key_fitness_to_string(fitness: Fitness) -> &'static str {
    fitness.as_str()
}

impl Display for Fitness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
