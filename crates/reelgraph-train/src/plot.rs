//! Loss-curve rendering.

use std::path::Path;

use plotters::prelude::*;

use crate::error::{Error, Result};

pub const PLOT_FILE: &str = "loss_plot.png";

/// Render the train/validation loss curves to a PNG.
///
/// Histories may have different lengths (a run interrupted mid-epoch);
/// each series is drawn over its own epoch range.
pub fn save_loss_plot(path: &Path, train_loss: &[f32], val_loss: &[f32]) -> Result<()> {
    let epochs = train_loss.len().max(val_loss.len());
    if epochs == 0 {
        return Ok(());
    }

    let y_max = train_loss
        .iter()
        .chain(val_loss)
        .copied()
        .fold(f32::MIN, f32::max)
        .max(1e-6);

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Training loss", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0usize..epochs.max(2) - 1, 0f32..y_max * 1.05)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc("loss")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            train_loss.iter().copied().enumerate(),
            &BLUE,
        ))
        .map_err(plot_err)?
        .label("train")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], BLUE));

    chart
        .draw_series(LineSeries::new(val_loss.iter().copied().enumerate(), &RED))
        .map_err(plot_err)?
        .label("val")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], RED));

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLOT_FILE);
        save_loss_plot(&path, &[0.9, 0.6, 0.5, 0.45], &[0.95, 0.7, 0.6, 0.58]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // PNG magic.
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }

    #[test]
    fn empty_histories_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLOT_FILE);
        save_loss_plot(&path, &[], &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn uneven_histories_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLOT_FILE);
        save_loss_plot(&path, &[0.9, 0.6, 0.5], &[0.95, 0.7]).unwrap();
        assert!(path.exists());
    }
}
