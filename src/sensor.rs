//! Sensor-space metadata shared by every matrix indexed by channel.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Physical type of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    /// MEG magnetometer (T).
    Magnetometer,
    /// MEG planar gradiometer (T/m).
    Gradiometer,
    /// EEG electrode (V).
    Electrode,
}

impl ChannelKind {
    /// Conventional scale bringing this kind to unit order of magnitude
    /// (fT for magnetometers, fT/cm for gradiometers, µV for electrodes).
    pub fn default_scale(self) -> f64 {
        match self {
            ChannelKind::Magnetometer => 1e15,
            ChannelKind::Gradiometer => 1e13,
            ChannelKind::Electrode => 1e6,
        }
    }

    /// Short name.
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Magnetometer => "mag",
            ChannelKind::Gradiometer => "grad",
            ChannelKind::Electrode => "eeg",
        }
    }
}

/// One channel descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name, unique within a sensor space.
    pub name: String,
    /// Physical type.
    pub kind: ChannelKind,
    /// Factor bringing this channel's values to unit order of magnitude.
    pub unit_scale: f64,
}

impl Channel {
    /// Channel with the default scale for its kind.
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unit_scale: kind.default_scale(),
        }
    }

    /// Override the unit scale.
    pub fn with_scale(mut self, unit_scale: f64) -> Self {
        self.unit_scale = unit_scale;
        self
    }
}

/// Ordered channel set.
///
/// Channel order is fixed: covariance rows, forward rows and data rows that
/// refer to this space use the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpace {
    channels: Vec<Channel>,
    /// Known linear-dependency constraints (projectors, average reference).
    n_constraints: usize,
}

impl SensorSpace {
    /// Build a sensor space, rejecting empty input, duplicate names and
    /// non-positive scales.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::InsufficientData {
                what: "channels",
                got: 0,
                need: 1,
            });
        }
        let mut seen = HashSet::with_capacity(channels.len());
        for ch in &channels {
            if !seen.insert(ch.name.as_str()) {
                return Err(Error::invalid(
                    "channels",
                    format!("duplicate channel name {}", ch.name),
                ));
            }
            if !(ch.unit_scale.is_finite() && ch.unit_scale > 0.0) {
                return Err(Error::invalid(
                    "unit_scale",
                    format!("channel {} has scale {}", ch.name, ch.unit_scale),
                ));
            }
        }
        Ok(Self {
            channels,
            n_constraints: 0,
        })
    }

    /// Record known linear constraints (e.g. 1 for a common average reference).
    pub fn with_constraints(mut self, n_constraints: usize) -> Result<Self> {
        if n_constraints >= self.channels.len() {
            return Err(Error::invalid(
                "n_constraints",
                format!(
                    "{} constraints leave no rank for {} channels",
                    n_constraints,
                    self.channels.len()
                ),
            ));
        }
        self.n_constraints = n_constraints;
        Ok(self)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false; construction rejects empty spaces.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Known linear constraints.
    pub fn n_constraints(&self) -> usize {
        self.n_constraints
    }

    /// Upper bound on the rank of any covariance over this space.
    pub fn max_rank(&self) -> usize {
        self.channels.len() - self.n_constraints
    }

    /// Channel descriptors in order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Channel names in order.
    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Channel kinds present, in a stable order.
    pub fn kinds_present(&self) -> BTreeSet<ChannelKind> {
        self.channels.iter().map(|c| c.kind).collect()
    }

    /// Indices of channels of one kind.
    pub fn indices_of(&self, kind: ChannelKind) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-channel scale factors.
    pub fn scalings(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.unit_scale).collect()
    }

    /// New space holding the named channels in the requested order.
    ///
    /// Constraints are dropped: they are not known to survive a subset.
    pub fn pick(&self, names: &[&str]) -> Result<Self> {
        let picked = names
            .iter()
            .map(|name| {
                self.channels
                    .iter()
                    .find(|c| c.name == *name)
                    .cloned()
                    .ok_or_else(|| Error::shape("channel pick", "a known channel", *name))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(picked)
    }

    /// Fail unless `names` lists exactly this space's channels in order.
    pub fn ensure_same_order<S: AsRef<str>>(
        &self,
        context: &'static str,
        names: &[S],
    ) -> Result<()> {
        if names.len() != self.channels.len() {
            return Err(Error::shape(
                context,
                format!("{} channels", self.channels.len()),
                format!("{} channels", names.len()),
            ));
        }
        for (ch, name) in self.channels.iter().zip(names) {
            if ch.name != name.as_ref() {
                return Err(Error::shape(context, &ch.name, name.as_ref()));
            }
        }
        Ok(())
    }
}

/// Fail unless `actual` lists the `expected` channel names in order.
pub(crate) fn ensure_names_match(
    context: &'static str,
    expected: &[String],
    actual: &[String],
) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(Error::shape(
            context,
            format!("{} channels", expected.len()),
            format!("{} channels", actual.len()),
        ));
    }
    match expected.iter().zip(actual).find(|(e, a)| e != a) {
        Some((e, a)) => Err(Error::shape(context, e, a)),
        None => Ok(()),
    }
}
