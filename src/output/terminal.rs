//! Terminal output formatting with colors and box drawing.

use colored::Colorize;

use crate::covariance::{CovarianceMatrix, CovarianceMethod};
use crate::source_estimate::SourceEstimate;
use crate::types::Hemisphere;

/// Format a covariance estimate for human-readable terminal output.
pub fn format_covariance(cov: &CovarianceMatrix) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("meg-inverse: covariance\n");
    output.push_str(&sep);
    output.push('\n');
    output.push('\n');

    output.push_str(&format!(
        "  Channels: {} ({} constraints)\n",
        cov.n_channels(),
        cov.n_constraints()
    ));
    output.push_str(&format!("  Samples:  {}\n", cov.n_samples()));
    output.push_str(&format!("  Method:   {}\n", format_method(cov.method())));
    if let Some(reg) = cov.regularization() {
        output.push_str(&format!("  Regularization: {reg:.3}\n"));
    }
    if let Some(ll) = cov.log_likelihood() {
        output.push_str(&format!("  Held-out log-likelihood: {ll:.2} per sample\n"));
    }
    output.push('\n');

    let full = cov.n_channels().saturating_sub(cov.n_constraints());
    let rank = format!("{} / {}", cov.rank(), cov.n_channels());
    if cov.rank() < full {
        output.push_str(&format!(
            "  {} {}\n",
            "\u{26A0} Rank deficient:".yellow().bold(),
            rank.yellow()
        ));
    } else {
        output.push_str(&format!("  {} {}\n", "\u{2713} Rank:".green().bold(), rank));
    }
    for (kind, r) in cov.rank_by_kind() {
        output.push_str(&format!("      {:<14} {}\n", kind.name(), r));
    }
    output.push('\n');
    output.push_str(&sep);
    output.push('\n');
    output
}

/// Format the peak of a source estimate.
pub fn format_peak(stc: &SourceEstimate) -> String {
    let Some(peak) = stc.peak() else {
        return format!("{}\n", "No samples in source estimate".yellow());
    };
    let hemi = match peak.location.hemisphere {
        Hemisphere::Left => "lh",
        Hemisphere::Right => "rh",
    };
    format!(
        "  Peak: {} vertex {} at {:.1} ms, value {}  [{}, {} locations]\n",
        hemi,
        peak.location.vertex,
        peak.time * 1e3,
        format!("{:.3e}", peak.value).bold(),
        stc.subject(),
        stc.n_sources()
    )
}

fn format_method(method: CovarianceMethod) -> String {
    match method {
        CovarianceMethod::Supplied => "supplied".dimmed().to_string(),
        other => other.name().cyan().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::{RankMode, Tolerance};
    use crate::epochs::TimeAxis;
    use crate::sensor::{Channel, ChannelKind, SensorSpace};
    use crate::types::{Matrix, SourceId};

    #[test]
    fn test_format_rank_deficient_covariance() {
        let sensors = SensorSpace::new(vec![
            Channel::new("E1", ChannelKind::Electrode),
            Channel::new("E2", ChannelKind::Electrode),
        ])
        .unwrap();
        let data = Matrix::from_row_slice(2, 2, &[1e-12, -1e-12, -1e-12, 1e-12]);
        let cov =
            CovarianceMatrix::from_matrix(&sensors, data, &RankMode::Auto, Tolerance::Auto, 100)
                .unwrap();
        let output = format_covariance(&cov);
        assert!(output.contains("Rank deficient"));
        assert!(output.contains("1 / 2"));
    }

    #[test]
    fn test_format_peak() {
        let stc = SourceEstimate::new(
            Matrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, -3.0]),
            1,
            TimeAxis::new(0.1, 1000.0, 2).unwrap(),
            vec![SourceId::left(7), SourceId::right(9)],
            "sample",
        )
        .unwrap();
        let output = format_peak(&stc);
        assert!(output.contains("rh vertex 9"));
        assert!(output.contains("101.0 ms"));
    }
}
