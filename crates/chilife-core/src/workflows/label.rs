use crate::core::models::structure::HostStructure;
use crate::core::rotamers::library::{BridgedLibrary, RotamerLibrary};
use crate::engine::bridging::BridgingEnsemble;
use crate::engine::config::{BridgeConfig, EnsembleConfig, SiteSpecifier};
use crate::engine::ensemble::RotamerEnsemble;
use crate::engine::error::EngineError;
use crate::engine::progress::{MinimizationObserver, Progress, ProgressReporter};
use tracing::{info, instrument};

/// Attaches a rotamer library to one host residue, evaluates it against the host and trims
/// the resulting populations, as configured.
#[instrument(skip_all, name = "label_workflow", fields(label, chain = %site.chain_id, residue = site.residue_number))]
pub fn place_label<H: HostStructure + ?Sized>(
    host: &H,
    library: &RotamerLibrary,
    site: &SiteSpecifier,
    label: &str,
    config: &EnsembleConfig,
    reporter: &ProgressReporter,
) -> Result<RotamerEnsemble, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Placement" });
    let mut ensemble = RotamerEnsemble::new(label, library, host, site, config.clone())?;
    reporter.report(Progress::PhaseFinish);

    if config.evaluate {
        reporter.report(Progress::PhaseStart { name: "Evaluation" });
        ensemble.evaluate_with_progress(reporter)?;
        reporter.report(Progress::PhaseFinish);

        if config.trim_after_evaluate {
            reporter.report(Progress::PhaseStart { name: "Trimming" });
            ensemble.trim_rotamers()?;
            reporter.report(Progress::PhaseFinish);
        }
    }

    info!(
        name = %ensemble.name(),
        rotamers = ensemble.len(),
        "Label placed."
    );
    Ok(ensemble)
}

/// Attaches a two-anchor library to a pair of host residues, closes its bridges, then
/// evaluates the fused label against the host and trims the populations, as configured.
#[instrument(skip_all, name = "bridged_label_workflow", fields(label, first = first_site.residue_number, second = second_site.residue_number))]
pub fn place_bridged_label<H: HostStructure + ?Sized>(
    host: &H,
    library: &BridgedLibrary,
    first_site: &SiteSpecifier,
    second_site: &SiteSpecifier,
    label: &str,
    config: &BridgeConfig,
    observer: Option<&dyn MinimizationObserver>,
    reporter: &ProgressReporter,
) -> Result<BridgingEnsemble, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Placement" });
    let mut ensemble =
        BridgingEnsemble::new(label, library, host, first_site, second_site, config.clone())?;
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Bridge Closure",
    });
    let diagnostics = ensemble.close_bridges_with(observer, reporter)?;
    if diagnostics.distorted {
        reporter.report(Progress::Message(format!(
            "Bridge closure error {:.3} A exceeds the soft threshold",
            diagnostics.min_error
        )));
    }
    reporter.report(Progress::PhaseFinish);

    if config.ensemble.evaluate {
        reporter.report(Progress::PhaseStart { name: "Evaluation" });
        ensemble.evaluate_with_progress(reporter)?;
        reporter.report(Progress::PhaseFinish);

        if config.ensemble.trim_after_evaluate {
            reporter.report(Progress::PhaseStart { name: "Trimming" });
            ensemble.trim_rotamers()?;
            reporter.report(Progress::PhaseFinish);
        }
    }

    info!(
        name = %ensemble.name(),
        rotamers = ensemble.len(),
        "Bridged label placed."
    );
    Ok(ensemble)
}
