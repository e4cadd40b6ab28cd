use std::path::PathBuf;

use anyhow::Result;
use irshot::cli::{
    interpolation_from_name, palette_from_name, quantization_from_name, RecoverOptions,
};
use irshot::{arg, args_parser, opt};

pub struct Args {
    pub paths: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub options: RecoverOptions,
    pub report: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("recover")
            .about("Recover relative IR intensity data from TG165/TG167 screen captures.")
            .arg(
                opt!("output")
                    .short("o")
                    .help("Directory to write the recolored bitmaps to"),
            )
            .arg(opt!("interpolation").short("i").help(
                "Crosshair replacement: zero, min, med, max, square-small, \
                 square-large, square-weight. Default is square-large",
            ))
            .arg(opt!("quantization").short("q").help(
                "Palette run collapse: exact, floor, ceiling, median-low, \
                 median-high. Default is median-low",
            ))
            .arg(
                opt!("palette")
                    .short("p")
                    .help("Output palette: iron, grayscale, rainbow. Default is iron"),
            )
            .arg(
                opt!("no crosshair")
                    .takes_value(false)
                    .help("Do not repaint the crosshair on the recolored output"),
            )
            .arg(
                opt!("report")
                    .takes_value(false)
                    .short("r")
                    .help("Write a JSON report to stdout"),
            )
            .arg(
                arg!("captures")
                    .required(true)
                    .multiple(true)
                    .help("Screen capture paths"),
            )
            .get_matches();

        let paths = matches
            .values_of("captures")
            .unwrap()
            .map(|f| f.into())
            .collect();
        let output = matches.value_of("output").map(PathBuf::from);
        let options = RecoverOptions {
            interpolation: interpolation_from_name(
                matches.value_of("interpolation").unwrap_or("square-large"),
            )?,
            quantization: quantization_from_name(
                matches.value_of("quantization").unwrap_or("median-low"),
            )?,
            palette: palette_from_name(matches.value_of("palette").unwrap_or("iron"))?,
            redraw: !matches.is_present("no crosshair"),
        };

        Ok(Args {
            paths,
            output,
            options,
            report: matches.is_present("report"),
        })
    }
}
