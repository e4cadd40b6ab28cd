mod args;

use anyhow::Result;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};

use crate::args::Args;
use irshot::cli::{recover_path, Report};

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;

    let bar = ProgressBar::new(args.paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );

    use rayon::prelude::*;
    let reports: Vec<Report> = args
        .paths
        .par_iter()
        .progress_with(bar)
        .map(|p| -> Result<Report> {
            let output = args.output.as_ref().map(|dir| {
                let stem = p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("capture");
                dir.join(format!("{}-ir.bmp", stem))
            });
            recover_path(p, output.as_deref(), args.options)
        })
        .try_fold(Vec::new, |mut acc, res| -> Result<_> {
            acc.push(res?);
            Ok(acc)
        })
        .try_reduce(Vec::new, |mut acc1, acc2| {
            acc1.extend(acc2);
            Ok(acc1)
        })?;

    eprintln!("Processed {} captures", reports.len());
    if args.report {
        serde_json::to_writer(std::io::stdout().lock(), &reports)?;
    }
    Ok(())
}
