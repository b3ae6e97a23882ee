mod broyden;

pub use broyden::BroydenStore;

use crate::defaults;
use crate::scf::history::HistoryBuffer;
use anyhow::{bail, Context, Result};
use derive_builder::Builder;
use log::debug;
use ndarray::prelude::*;
use qsmix_parallel::ProcessGroup;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mixing methods that can be configured. Only the Broyden method is
/// available for atomic charges.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MixingMethod {
    Direct,
    Kerker,
    Pulay,
    Broyden,
    BroydenNew,
    Multisecant,
}

impl fmt::Display for MixingMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name: &str = match self {
            MixingMethod::Direct => "Direct",
            MixingMethod::Kerker => "Kerker",
            MixingMethod::Pulay => "Pulay",
            MixingMethod::Broyden => "Broyden",
            MixingMethod::BroydenNew => "New Broyden",
            MixingMethod::Multisecant => "Multisecant",
        };
        write!(f, "{}", name)
    }
}

/// Kind of update that was applied to the charges in one call of the mixer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MixLabel {
    NoMix,
    Mixing,
    Broyden,
}

impl fmt::Display for MixLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name: &str = match self {
            MixLabel::NoMix => "NoMix",
            MixLabel::Mixing => "Mixing",
            MixLabel::Broyden => "Broyden",
        };
        write!(f, "{}", name)
    }
}

/// Mixer for atomic charges `[n_atoms, n_spin]` that are replicated on all ranks
/// of a process group. Every rank keeps the history of its own atoms only.
#[derive(Builder, Clone, Debug)]
pub struct ChargeMixer {
    method: MixingMethod,
    /// Atoms that are owned by this rank.
    local_atoms: Vec<usize>,
    #[builder(default = "defaults::MIXING_ALPHA")]
    alpha: f64,
    /// Number of iterations without mixing.
    #[builder(default = "defaults::NSKIP_MIXING")]
    nskip_mixing: usize,
    /// Number of iterations with simple mixing.
    #[builder(default = "defaults::N_SIMPLE_MIX")]
    n_simple_mix: usize,
    #[builder(default = "defaults::MIXING_NBUFFER")]
    nbuffer: usize,
    /// Input charges and their differences to the resulting output charges.
    #[builder(default = "self.default_history()?", setter(skip))]
    history: HistoryBuffer<Array2<f64>>,
    #[builder(default = "self.default_broyden()?", setter(skip))]
    broyden: BroydenStore,
}

impl ChargeMixerBuilder {
    fn buffer_length(&self) -> Result<usize, String> {
        match self.nbuffer.unwrap_or(defaults::MIXING_NBUFFER) {
            0 => Err("The charge mixer needs a history of at least one entry".to_string()),
            n => Ok(n),
        }
    }

    fn default_history(&self) -> Result<HistoryBuffer<Array2<f64>>, String> {
        Ok(HistoryBuffer::new(self.buffer_length()?))
    }

    fn default_broyden(&self) -> Result<BroydenStore, String> {
        Ok(BroydenStore::new(self.buffer_length()?))
    }
}

impl ChargeMixer {
    /// Replaces the output `charges` of the current SCF iteration (numbered from 1)
    /// by the input charges for the next iteration.
    pub fn mix<G: ProcessGroup + ?Sized>(
        &mut self,
        charges: &mut Array2<f64>,
        iter_count: usize,
        group: &G,
    ) -> Result<MixLabel> {
        let local: Array2<f64> = charges.select(Axis(0), &self.local_atoms);

        // difference between the new charges and the input charges of the last call
        if let Some(previous) = self.history.last_slot() {
            let delta: Array2<f64> = &local - self.history.slot(previous);
            self.history.store_error(previous, &delta);
        }
        // calls with a valid charge difference
        let n_diffed: usize = self.history.active_count();

        let label: MixLabel = if iter_count == 1 || iter_count + 1 <= self.nskip_mixing || n_diffed == 0
        {
            MixLabel::NoMix
        } else if iter_count + 1 - self.nskip_mixing <= self.n_simple_mix || n_diffed == 1 {
            let new_local: Array2<f64> = self.simple_mixing();
            self.replicate(charges, &new_local, group)?;
            MixLabel::Mixing
        } else {
            match self.method {
                MixingMethod::Broyden => {
                    let new_local: Array2<f64> = self.broyden_mixing(group)?;
                    self.replicate(charges, &new_local, group)?;
                    MixLabel::Broyden
                }
                method => bail!("Mixing method {} is not available for Charge Mixing", method),
            }
        };
        debug!("charge mixing in iteration {}: {}", iter_count, label);

        // the new input charges are diffed against the output of the next call
        let local: Array2<f64> = charges.select(Axis(0), &self.local_atoms);
        let slot: usize = self.history.advance();
        self.history.store(slot, &local);
        Ok(label)
    }

    /// Forgets the charge history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.broyden.clear();
    }

    /// new = alpha * dq - q_in
    fn simple_mixing(&self) -> Array2<f64> {
        let previous: usize = self.history.last_slot().unwrap_or(0);
        self.alpha * self.history.error(previous) - self.history.slot(previous)
    }

    fn broyden_mixing<G: ProcessGroup + ?Sized>(&mut self, group: &G) -> Result<Array2<f64>> {
        let (now, old): (usize, usize) = match (
            self.history.last_slot(),
            self.history.second_to_last_slot(),
        ) {
            (Some(now), Some(old)) => (now, old),
            _ => bail!("Broyden mixing needs the charges of two previous iterations"),
        };
        let shape = self.history.slot(now).raw_dim();
        let flat = |array: &Array2<f64>| -> Array1<f64> { array.iter().cloned().collect() };

        let q_new: Array1<f64> = self.broyden.update(
            flat(self.history.slot(now)).view(),
            flat(self.history.error(now)).view(),
            flat(self.history.slot(old)).view(),
            flat(self.history.error(old)).view(),
            self.alpha,
            group,
        )?;
        q_new
            .into_shape(shape)
            .context("Broyden update changed the shape of the charges")
    }

    /// Writes the new charges of the local atoms into the replicated `charges`.
    fn replicate<G: ProcessGroup + ?Sized>(
        &self,
        charges: &mut Array2<f64>,
        local: &Array2<f64>,
        group: &G,
    ) -> Result<()> {
        let mut buffer: Array2<f64> = Array2::zeros(charges.raw_dim());
        for (row, atom) in self.local_atoms.iter().enumerate() {
            buffer.row_mut(*atom).assign(&local.row(row));
        }
        let data: &mut [f64] = buffer
            .as_slice_mut()
            .context("charge buffer is not contiguous")?;
        group.sum(data);
        charges.assign(&buffer);
        Ok(())
    }
}
