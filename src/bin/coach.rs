use anyhow::Context;
use cattus_coach::coach::config::CoachConfig;
use cattus_coach::coach::Coach;
use cattus_coach::game::common::IGame;
use cattus_coach::net::linear::LinearNet;
use cattus_coach::ttt::ttt_game::TttGame;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
    /// JSON config file, missing options keep their default.
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    run_name: Option<String>,
    #[clap(long)]
    workers: Option<usize>,
    #[clap(long)]
    num_iters: Option<usize>,
    #[clap(long)]
    games_per_iteration: Option<usize>,
    #[clap(long)]
    process_batch_size: Option<usize>,
    #[clap(long)]
    arena_seed: Option<u64>,
    #[clap(long)]
    checkpoint: Option<PathBuf>,
    #[clap(long)]
    data: Option<PathBuf>,
    /// Start a new run, deleting the checkpoints, samples and scalars of an existing one.
    #[clap(long)]
    no_load_model: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<CoachConfig> {
        let mut config = match &self.config {
            Some(path) => CoachConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CoachConfig::default(),
        };
        if let Some(run_name) = self.run_name {
            config.run_name = run_name;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(num_iters) = self.num_iters {
            config.num_iters = num_iters;
        }
        if let Some(games) = self.games_per_iteration {
            config.games_per_iteration = games;
        }
        if let Some(batch_size) = self.process_batch_size {
            config.process_batch_size = batch_size;
        }
        if self.arena_seed.is_some() {
            config.arena_seed = self.arena_seed;
        }
        if let Some(checkpoint) = self.checkpoint {
            config.checkpoint = checkpoint;
        }
        if let Some(data) = self.data {
            config.data = data;
        }
        if self.no_load_model {
            config.load_model = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    cattus_coach::util::init_globals();

    let config = Args::parse().into_config()?;
    log::info!("Starting run '{}' with {} workers", config.run_name, config.workers);

    let game = Arc::new(TttGame);
    let new_net = || LinearNet::new(game.observation_len(), game.action_size(), config.lr);
    let (net, past_net) = (new_net(), new_net());
    let mut coach = Coach::new(game.clone(), net, past_net, config).context("starting the coach")?;
    coach.learn()?;
    Ok(())
}
