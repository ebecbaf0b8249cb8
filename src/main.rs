use clap::Parser;
use danet::checkpoint::DirCheckpointStore;
use danet::dataset::{Dataset, Split, WavDirDataset};
use danet::metrics::LogSink;
use danet::model::Model;
use danet::nn::RecurrentState;
use danet::train::{TrainOptions, Trainer};
use danet::{HParams, io};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Train,
    Test,
    Demo,
}

impl FromStr for Mode {
    type Err = danet::Error;

    fn from_str(name: &str) -> danet::Result<Self> {
        match name {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            "demo" => Ok(Mode::Demo),
            _ => Err(danet::Error::UnknownVariant {
                kind: "mode",
                name: name.to_string(),
                expected: "train, test, demo",
            }),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Deep attractor network source separation")]
struct Args {
    /// Experiment name; prefixes per-epoch checkpoints.
    #[arg(short, long, default_value = "UnnamedExperiment")]
    name: String,
    /// One of "train", "test", "demo".
    #[arg(short, long, default_value = "train")]
    mode: String,
    /// Parameters to load before running.
    #[arg(short, long)]
    input_pfile: Option<PathBuf>,
    /// Where to write the parameters after training.
    #[arg(short, long)]
    output_pfile: Option<PathBuf>,
    #[arg(long = "num-epoch", visible_alias = "ne", default_value_t = 10)]
    num_epoch: usize,
    #[arg(long, default_value_t = false)]
    no_save_on_epoch: bool,
    #[arg(long, default_value_t = false)]
    no_valid_on_epoch: bool,
    /// Mixture WAV file for demo mode.
    #[arg(long = "input-file", visible_alias = "if")]
    input_file: Option<PathBuf>,
    /// Dataset root holding train/, valid/ and test/ track folders.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
    /// JSON hyper-parameter overrides.
    #[arg(long)]
    hparams: Option<PathBuf>,
    #[arg(long, default_value = "saves")]
    save_dir: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn open_dataset(dir: Option<&Path>, hparams: &HParams) -> danet::Result<WavDirDataset> {
    let dir = dir.ok_or(danet::Error::MissingInput {
        what: "dataset directory",
        flag: "--data-dir",
    })?;
    info!("preparing dataset {} ...", dir.display());
    WavDirDataset::open(danet::files::expand_tilde(dir), hparams)
}

/// Report a missing mixture or dataset before anything is built.
fn check_inputs(mode: Mode, args: &Args) -> danet::Result<()> {
    match (mode, &args.input_file, &args.data_dir) {
        (Mode::Demo, None, None) => Err(danet::Error::MissingInput {
            what: "WAV file",
            flag: "--input-file",
        }),
        (Mode::Train | Mode::Test, _, None) => Err(danet::Error::MissingInput {
            what: "dataset directory",
            flag: "--data-dir",
        }),
        _ => Ok(()),
    }
}

fn run(args: Args) -> danet::Result<()> {
    let mode: Mode = args.mode.parse()?;
    check_inputs(mode, &args)?;
    let mut hparams = match &args.hparams {
        Some(path) => HParams::from_json_file(path)?,
        None => HParams::default(),
    };
    if mode == Mode::Demo {
        warn!("setting batch_size to 1 for demo mode");
        hparams.batch_size = 1;
    }
    info!("encoder type: {:?}", hparams.encoder);
    info!("training estimator type: {:?}", hparams.train_estimator);
    info!("inference estimator type: {:?}", hparams.infer_estimator);

    let mut model = Model::build(&args.name, &hparams, candle_core::Device::Cpu)?;
    if let Some(path) = &args.input_pfile {
        info!("loading parameters from {}", path.display());
        model.registry_mut().load(path)?;
    }

    let store = DirCheckpointStore::new(&args.save_dir);
    match mode {
        Mode::Train => {
            let dataset = open_dataset(args.data_dir.as_deref(), &hparams)?;
            let options = TrainOptions {
                num_epoch: args.num_epoch,
                save_on_epoch: !args.no_save_on_epoch,
                valid_on_epoch: !args.no_valid_on_epoch,
            };
            Trainer::new(&mut model, &store, &LogSink)?.train(&dataset, &options)?;
            if let Some(path) = &args.output_pfile {
                model.registry().save(path)?;
                info!("saved parameters into {}", path.display());
            }
        }
        Mode::Test => {
            let dataset = open_dataset(args.data_dir.as_deref(), &hparams)?;
            let report = Trainer::new(&mut model, &store, &LogSink)?.evaluate(&dataset, Split::Test)?;
            info!("test: {report}");
        }
        Mode::Demo => demo(&model, &args, &hparams)?,
    }
    Ok(())
}

/// Separate one mixture into `<stem>_separated_<k>.wav` files.
///
/// Without `--input-file` the mixture is built from the first test-split
/// example and written to `demo.wav` first.
fn demo(model: &Model, args: &Args, hparams: &HParams) -> danet::Result<()> {
    let (path, mixture) = match (&args.input_file, &args.data_dir) {
        (Some(path), _) => (path.clone(), io::load_wavfile(Some(path), hparams)?),
        (None, Some(dir)) => {
            let dataset = open_dataset(Some(dir), hparams)?;
            let batch = dataset
                .epoch(Split::Test, 1, hparams.max_n_signal, false)
                .next()
                .ok_or_else(|| danet::Error::Dataset("test split has too few tracks".to_string()))??;
            let mixture = batch.mixture().index_axis_move(ndarray::Axis(0), 0);
            let path = PathBuf::from("demo.wav");
            io::save_wavfile(&path, mixture.view(), hparams)?;
            (path, mixture)
        }
        (None, None) => return check_inputs(Mode::Demo, args),
    };

    let sources = model.separate(&mixture, &mut RecurrentState::new())?;
    let stem = path.with_extension("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("wav");
    for (i, source) in sources.outer_iter().enumerate() {
        let out = PathBuf::from(format!("{}_separated_{}.{ext}", stem.display(), i + 1));
        io::save_wavfile(&out, source, hparams)?;
        info!("wrote {}", out.display());
    }
    Ok(())
}
