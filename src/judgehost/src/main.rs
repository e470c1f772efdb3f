use anyhow::Context;
use judgehost::{config::JudgehostConfig, EvalEnv, Evaluator};
use judgehost_api::EvaluationPlan;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

#[derive(clap::Parser, Debug)]
#[command(author, about)]
struct Args {
    /// Evaluation plan, in JSON
    #[arg(long)]
    plan: PathBuf,
    /// Directory for staging areas. Must not be shared with another
    /// evaluation.
    #[arg(long)]
    root: PathBuf,
    /// Judgehost config, in YAML
    #[arg(long, env = "JUDGEHOST_CONFIG")]
    config: Option<PathBuf>,
}

fn load_plan(path: &Path) -> anyhow::Result<EvaluationPlan> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    use clap::Parser;
    dotenv::dotenv().ok();
    judgehost::log::setup();
    let args = Args::parse();
    tracing::debug!(args = ?args, "starting");

    let config = JudgehostConfig::discover(args.config.as_deref())?;
    let plan = load_plan(&args.plan)?;
    let env = EvalEnv::from_config(&config);

    let (tx, rx) = judgehost::result_channel();
    let evaluator =
        Evaluator::new(&args.root, plan, tx, env).context("failed to initialize evaluator")?;
    let printer = std::thread::spawn(move || -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for result in rx {
            serde_json::to_writer(&mut out, &result).context("failed to serialize result")?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(())
    });

    let outcome = evaluator.evaluate().context("evaluation failed");
    let printed = match printer.join() {
        Ok(res) => res,
        Err(_) => anyhow::bail!("result printer panicked"),
    };
    outcome?;
    printed
}
