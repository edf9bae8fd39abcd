// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with `clap` and runs the requested
// modes. All work is delegated to Layer 2 (application).
//
// Modes, run in this order when several are given:
//   1. --train            k-fold cross-validated training
//   2. --visualize        Grad-CAM overlays for --images
//   3. --confusion-matrix evaluate the checkpoint on --test-dir
//
// Each mode loads its own model from --checkpoint.

pub mod commands;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use commands::RunArgs;

use crate::application::{
    confusion_use_case::ConfusionMatrixUseCase,
    cross_validation::CrossValidationReport,
    train_use_case::TrainUseCase,
    visualize_use_case::VisualizeUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "vit-kfold",
    version,
    about = "K-fold cross-validated vision transformer training, Grad-CAM and confusion matrices."
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .multiple(true)
        .args(["train", "visualize", "confusion_matrix"])
))]
pub struct Cli {
    /// Train with k-fold cross-validation
    #[arg(long)]
    pub train: bool,

    /// Write Grad-CAM overlays for --images
    #[arg(long)]
    pub visualize: bool,

    /// Evaluate the checkpoint on --test-dir and render the matrix
    #[arg(long)]
    pub confusion_matrix: bool,

    #[command(flatten)]
    pub args: RunArgs,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        if self.train {
            self.run_train().context("training failed")?;
        }
        if self.visualize {
            self.run_visualize().context("visualisation failed")?;
        }
        if self.confusion_matrix {
            self.run_confusion().context("evaluation failed")?;
        }
        Ok(())
    }

    fn run_train(&self) -> Result<()> {
        tracing::info!("Training on images in: {}", self.args.train_dir.display());
        let report = TrainUseCase::new((&self.args).into()).execute()?;
        print_report(&report);
        Ok(())
    }

    fn run_visualize(&self) -> Result<()> {
        let explanations = VisualizeUseCase::new((&self.args).into()).execute()?;
        for e in &explanations {
            println!(
                "{} → {} ({:.1}%)  saved {}",
                e.image.display(),
                e.class_name,
                e.probability * 100.0,
                e.output.display()
            );
        }
        Ok(())
    }

    fn run_confusion(&self) -> Result<()> {
        let outcome = ConfusionMatrixUseCase::new((&self.args).into()).execute()?;
        println!("\n{}", outcome.summary);
        println!("Confusion matrix saved to {}", outcome.image.display());
        Ok(())
    }
}

fn print_report(report: &CrossValidationReport) {
    println!("\n{:>4} | {:>10} | {:>9} | {:>8} | {:>7}", "Fold", "Train loss", "Train acc", "Val loss", "Val acc");
    for h in &report.histories {
        if let Some(m) = h.last() {
            println!(
                "{:>4} | {:>10.4} | {:>9.4} | {:>8.4} | {:>7.4}",
                h.fold, m.train_loss, m.train_accuracy, m.val_loss, m.val_accuracy
            );
        }
    }
    let s = &report.summary;
    println!(
        "\n{} folds: val acc {:.4} ± {:.4}, val loss {:.4} ± {:.4}",
        s.folds, s.mean_val_accuracy, s.std_val_accuracy, s.mean_val_loss, s.std_val_loss
    );
    if let Some(last) = report.checkpoints.last() {
        println!("Checkpoint saved to {}", last.display());
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    use crate::application::config::{DeviceKind, TrainConfig, VisualizeConfig};
    use crate::domain::metrics::SelectionMetric;
    use crate::infra::checkpoint::CheckpointPolicy;

    #[test]
    fn test_command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_a_mode_is_required() {
        assert!(Cli::try_parse_from(["vit-kfold", "--epochs", "3"]).is_err());
    }

    #[test]
    fn test_train_args_convert() {
        let cli = Cli::try_parse_from([
            "vit-kfold", "--train", "--confusion-matrix",
            "--k-folds", "3",
            "--checkpoint-policy", "best-loss",
            "--device", "wgpu",
            "--num-classes", "4",
        ])
        .unwrap();
        assert!(cli.train && cli.confusion_matrix && !cli.visualize);

        let cfg: TrainConfig = (&cli.args).into();
        assert_eq!(cfg.k_folds, 3);
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::KeepBest(SelectionMetric::ValLoss));
        assert_eq!(cfg.device, DeviceKind::Wgpu);
        assert_eq!(cfg.num_classes, Some(4));
        assert_eq!(cfg.model.image_size, 224);
    }

    #[test]
    fn test_images_accept_commas_and_repeats() {
        let cli = Cli::try_parse_from([
            "vit-kfold", "--visualize", "--images", "a.png,b.png", "--images", "c.png", "--target-block", "2",
        ])
        .unwrap();
        let cfg: VisualizeConfig = (&cli.args).into();
        assert_eq!(cfg.images.len(), 3);
        assert_eq!(cfg.target_block, Some(2));
    }
}
