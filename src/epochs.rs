//! Epochs, evoked averages and their time axes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sensor::SensorSpace;
use crate::types::Matrix;

/// Uniformly sampled time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    /// Time of the first sample in seconds.
    pub t0: f64,
    /// Sampling frequency in Hz.
    pub sfreq: f64,
    /// Number of samples.
    pub n_times: usize,
}

impl TimeAxis {
    /// Create a time axis; `sfreq` must be positive and finite.
    pub fn new(t0: f64, sfreq: f64, n_times: usize) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(Error::invalid("sfreq", format!("{sfreq} Hz")));
        }
        Ok(Self { t0, sfreq, n_times })
    }

    /// Time of sample `i`.
    pub fn time(&self, i: usize) -> f64 {
        self.t0 + i as f64 / self.sfreq
    }

    /// Time of the last sample.
    pub fn end(&self) -> f64 {
        self.time(self.n_times.saturating_sub(1))
    }

    /// All sample times.
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times).map(|i| self.time(i)).collect()
    }

    /// Inclusive sample index range falling inside `[tmin, tmax]`.
    ///
    /// `None` bounds select from the first / to the last sample. Bounds are
    /// compared with half a sample of tolerance, so the returned endpoints
    /// are the nearest samples lying inside the range.
    pub fn index_range(&self, tmin: Option<f64>, tmax: Option<f64>) -> Result<(usize, usize)> {
        let start = self.t0;
        let end = self.end();
        let lo = tmin.unwrap_or(start);
        let hi = tmax.unwrap_or(end);
        let out_of_bounds = Error::TimeRange {
            tmin: lo,
            tmax: hi,
            start,
            end,
        };
        if self.n_times == 0 || lo > hi {
            return Err(out_of_bounds);
        }

        let half = 0.5 / self.sfreq;
        let first = ((lo - self.t0) * self.sfreq - 1e-9).ceil().max(0.0);
        let last = ((hi - self.t0) * self.sfreq + 1e-9).floor();
        if last < 0.0 || first > (self.n_times - 1) as f64 || hi < start - half || lo > end + half {
            return Err(out_of_bounds);
        }
        let first = first as usize;
        let last = (last as usize).min(self.n_times - 1);
        if first > last {
            return Err(out_of_bounds);
        }
        Ok((first, last))
    }

    /// Axis restricted to an inclusive index range.
    pub fn slice(&self, first: usize, last: usize) -> Self {
        Self {
            t0: self.time(first),
            sfreq: self.sfreq,
            n_times: last - first + 1,
        }
    }

    /// Same sampling grid within a fraction of a sample.
    pub fn matches(&self, other: &Self) -> bool {
        self.n_times == other.n_times
            && (self.sfreq - other.sfreq).abs() <= 1e-9 * self.sfreq
            && (self.t0 - other.t0).abs() <= 1e-3 / self.sfreq
    }
}

/// A labeled multichannel time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    /// Condition label.
    pub label: String,
    /// Samples, channels × time.
    pub data: Matrix,
    /// Time axis of the columns.
    pub times: TimeAxis,
}

impl Epoch {
    /// Create an epoch; the axis length must match the column count.
    pub fn new(label: impl Into<String>, data: Matrix, times: TimeAxis) -> Result<Self> {
        if data.ncols() != times.n_times {
            return Err(Error::shape(
                "epoch time axis",
                format!("{} samples", times.n_times),
                format!("{} columns", data.ncols()),
            ));
        }
        Ok(Self {
            label: label.into(),
            data,
            times,
        })
    }

    /// Columns inside `[tmin, tmax]`.
    pub fn crop(&self, tmin: Option<f64>, tmax: Option<f64>) -> Result<Self> {
        let (first, last) = self.times.index_range(tmin, tmax)?;
        Ok(Self {
            label: self.label.clone(),
            data: self.data.columns(first, last - first + 1).into_owned(),
            times: self.times.slice(first, last),
        })
    }
}

/// Epochs sharing a sensor space, grouped by condition label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSet {
    sensors: SensorSpace,
    epochs: Vec<Epoch>,
}

impl EpochSet {
    /// Create a set; every epoch must have one row per channel and the same
    /// time axis.
    pub fn new(sensors: SensorSpace, epochs: Vec<Epoch>) -> Result<Self> {
        if let Some(first) = epochs.first() {
            for epoch in &epochs {
                if epoch.data.nrows() != sensors.len() {
                    return Err(Error::shape(
                        "epoch channels",
                        format!("{} rows", sensors.len()),
                        format!("{} rows", epoch.data.nrows()),
                    ));
                }
                if !epoch.times.matches(&first.times) {
                    return Err(Error::shape(
                        "epoch time axis",
                        format!("{:?}", first.times),
                        format!("{:?}", epoch.times),
                    ));
                }
            }
        }
        Ok(Self { sensors, epochs })
    }

    /// Sensor space.
    pub fn sensors(&self) -> &SensorSpace {
        &self.sensors
    }

    /// All epochs.
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Number of epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// True when the set holds no epochs.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for epoch in &self.epochs {
            if !labels.contains(&epoch.label.as_str()) {
                labels.push(&epoch.label);
            }
        }
        labels
    }

    /// New set holding only the epochs with `label`.
    pub fn select(&self, label: &str) -> Self {
        Self {
            sensors: self.sensors.clone(),
            epochs: self
                .epochs
                .iter()
                .filter(|e| e.label == label)
                .cloned()
                .collect(),
        }
    }

    /// New set with each channel's mean over `[tmin, tmax]` subtracted.
    pub fn apply_baseline(&self, tmin: Option<f64>, tmax: Option<f64>) -> Result<Self> {
        let epochs = self
            .epochs
            .iter()
            .map(|epoch| {
                let (first, last) = epoch.times.index_range(tmin, tmax)?;
                let width = last - first + 1;
                let mut data = epoch.data.clone();
                for mut row in data.row_iter_mut() {
                    let mean = row.columns(first, width).sum() / width as f64;
                    row.add_scalar_mut(-mean);
                }
                Ok(Epoch {
                    label: epoch.label.clone(),
                    data,
                    times: epoch.times,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sensors: self.sensors.clone(),
            epochs,
        })
    }

    /// Sample mean of the epochs labeled `label`.
    pub fn average(&self, label: &str) -> Result<Evoked> {
        let members: Vec<&Epoch> = self.epochs.iter().filter(|e| e.label == label).collect();
        let first = members.first().ok_or(Error::InsufficientData {
            what: "epochs with the requested label",
            got: 0,
            need: 1,
        })?;
        let mut sum = Matrix::zeros(first.data.nrows(), first.data.ncols());
        for epoch in &members {
            sum += &epoch.data;
        }
        let nave = members.len();
        Ok(Evoked {
            label: label.to_string(),
            channel_names: self.sensors.names(),
            data: sum / nave as f64,
            times: first.times,
            nave: nave as f64,
        })
    }
}

/// Trial average for one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evoked {
    /// Condition label.
    pub label: String,
    /// Channel names, in row order.
    pub channel_names: Vec<String>,
    /// Averaged samples, channels × time.
    pub data: Matrix,
    /// Time axis of the columns.
    pub times: TimeAxis,
    /// Effective number of averaged trials.
    pub nave: f64,
}

impl Evoked {
    /// Wrap externally averaged data.
    pub fn new(
        label: impl Into<String>,
        sensors: &SensorSpace,
        data: Matrix,
        times: TimeAxis,
        nave: f64,
    ) -> Result<Self> {
        if data.nrows() != sensors.len() || data.ncols() != times.n_times {
            return Err(Error::shape(
                "evoked data",
                format!("{}x{}", sensors.len(), times.n_times),
                format!("{}x{}", data.nrows(), data.ncols()),
            ));
        }
        if !(nave.is_finite() && nave >= 1.0) {
            return Err(Error::invalid("nave", format!("{nave} < 1")));
        }
        Ok(Self {
            label: label.into(),
            channel_names: sensors.names(),
            data,
            times,
            nave,
        })
    }

    /// Columns inside `[tmin, tmax]`.
    pub fn crop(&self, tmin: Option<f64>, tmax: Option<f64>) -> Result<Self> {
        let (first, last) = self.times.index_range(tmin, tmax)?;
        Ok(Self {
            data: self.data.columns(first, last - first + 1).into_owned(),
            times: self.times.slice(first, last),
            ..self.clone()
        })
    }

    /// Weighted sum of evoked responses on the same channels and time axis.
    ///
    /// The effective `nave` follows the variance of a weighted sum of
    /// independent averages: `1 / Σ wᵢ² / naveᵢ`.
    pub fn linear_combination(terms: &[(&Evoked, f64)]) -> Result<Self> {
        let (first, _) = terms.first().ok_or(Error::InsufficientData {
            what: "evoked terms",
            got: 0,
            need: 1,
        })?;
        let mut data = Matrix::zeros(first.data.nrows(), first.data.ncols());
        let mut inv_nave = 0.0;
        for (evoked, weight) in terms {
            if evoked.channel_names != first.channel_names {
                return Err(Error::shape(
                    "evoked combination",
                    first.channel_names.join(","),
                    evoked.channel_names.join(","),
                ));
            }
            if !evoked.times.matches(&first.times) {
                return Err(Error::shape(
                    "evoked combination",
                    format!("{:?}", first.times),
                    format!("{:?}", evoked.times),
                ));
            }
            data += &evoked.data * *weight;
            inv_nave += weight * weight / evoked.nave;
        }
        let nave = if inv_nave > 0.0 { (1.0 / inv_nave).max(1.0) } else { 1.0 };
        let label = terms
            .iter()
            .map(|(e, w)| format!("{w:+}*{}", e.label))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Self {
            label,
            channel_names: first.channel_names.clone(),
            data,
            times: first.times,
            nave,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{Channel, ChannelKind};

    fn sensors() -> SensorSpace {
        SensorSpace::new(vec![
            Channel::new("E1", ChannelKind::Electrode),
            Channel::new("E2", ChannelKind::Electrode),
        ])
        .unwrap()
    }

    #[test]
    fn test_index_range_inside() {
        let axis = TimeAxis::new(-0.1, 100.0, 31).unwrap();
        let (first, last) = axis.index_range(Some(0.0), Some(0.1)).unwrap();
        assert_eq!(first, 10);
        assert_eq!(last, 20);
        assert!((axis.time(first) - 0.0).abs() < 1e-12);
        assert!((axis.time(last) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_index_range_between_samples() {
        let axis = TimeAxis::new(0.0, 10.0, 11).unwrap();
        let (first, last) = axis.index_range(Some(0.15), Some(0.42)).unwrap();
        assert_eq!((first, last), (2, 4));
    }

    #[test]
    fn test_index_range_outside() {
        let axis = TimeAxis::new(0.0, 10.0, 11).unwrap();
        assert!(matches!(
            axis.index_range(Some(2.0), Some(3.0)),
            Err(Error::TimeRange { .. })
        ));
        assert!(axis.index_range(Some(-3.0), Some(-2.0)).is_err());
        assert!(axis.index_range(Some(0.5), Some(0.2)).is_err());
    }

    #[test]
    fn test_average_and_nave() {
        let axis = TimeAxis::new(0.0, 1.0, 2).unwrap();
        let a = Epoch::new("aud", Matrix::from_element(2, 2, 1.0), axis).unwrap();
        let b = Epoch::new("aud", Matrix::from_element(2, 2, 3.0), axis).unwrap();
        let c = Epoch::new("vis", Matrix::from_element(2, 2, 9.0), axis).unwrap();
        let set = EpochSet::new(sensors(), vec![a, b, c]).unwrap();

        assert_eq!(set.labels(), vec!["aud", "vis"]);
        let evoked = set.average("aud").unwrap();
        assert_eq!(evoked.nave, 2.0);
        assert!((evoked.data[(0, 0)] - 2.0).abs() < 1e-12);
        assert!(set.average("somato").is_err());
    }

    #[test]
    fn test_select_keeps_matching_label() {
        let axis = TimeAxis::new(0.0, 1.0, 2).unwrap();
        let epochs = ["aud", "vis", "aud"]
            .iter()
            .map(|label| Epoch::new(*label, Matrix::zeros(2, 2), axis).unwrap())
            .collect();
        let set = EpochSet::new(sensors(), epochs).unwrap();

        let aud = set.select("aud");
        assert_eq!(aud.len(), 2);
        assert_eq!(aud.labels(), vec!["aud"]);
        assert_eq!(aud.sensors().len(), 2);
        assert!(set.select("somato").is_empty());
    }

    #[test]
    fn test_baseline_removes_prestimulus_mean() {
        let axis = TimeAxis::new(-0.2, 10.0, 5).unwrap();
        let data =
            Matrix::from_row_slice(2, 5, &[1.0, 1.0, 1.0, 5.0, 5.0, 2.0, 4.0, 0.0, 0.0, 0.0]);
        let set = EpochSet::new(sensors(), vec![Epoch::new("x", data, axis).unwrap()]).unwrap();
        let corrected = set.apply_baseline(None, Some(0.0)).unwrap();
        let d = &corrected.epochs()[0].data;
        assert!(d[(0, 0)].abs() < 1e-12);
        assert!((d[(0, 3)] - 4.0).abs() < 1e-12);
        assert!(d[(1, 0)].abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_epoch_rejected() {
        let axis = TimeAxis::new(0.0, 1.0, 2).unwrap();
        let bad = Epoch::new("x", Matrix::zeros(3, 2), axis).unwrap();
        assert!(EpochSet::new(sensors(), vec![bad]).is_err());
    }
}
