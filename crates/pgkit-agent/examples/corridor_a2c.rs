//! Example: A2C on a batch of standardized grid mazes

use pgkit_agent::{A2CAgent, Agent, AgentConfig, LinearPolicyConfig, LinearSoftmaxPolicy, SegmentRunner};
use pgkit_env::{make_envs, GridMazeConfig, GridMazeEnv, SerialVecEnv, StandardizeConfig, StandardizeVecEnv};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let maze = GridMazeConfig {
        random_start: true,
        ..GridMazeConfig::default()
    };
    let envs = make_envs(|_| GridMazeEnv::new(maze.clone()), 8, 0)?;
    let obs_dim = maze.height * maze.width;
    let venv = StandardizeVecEnv::new(SerialVecEnv::new(envs)?, StandardizeConfig::default())?;
    let mut runner = SegmentRunner::new(venv);

    let policy = LinearSoftmaxPolicy::new(LinearPolicyConfig {
        obs_dim,
        num_actions: 4,
        use_value_head: true,
        init_scale: 0.01,
        seed: Some(0),
    })?;
    let config = AgentConfig {
        learning_rate: 0.05,
        lr_decay_steps: Some(500),
        ..AgentConfig::default()
    };
    let mut agent = A2CAgent::new(Box::new(policy), config)?;
    let mut rng = StdRng::seed_from_u64(0);

    for iteration in 0..500 {
        let segment = runner.run(&agent, 5, &mut rng)?;
        let output = agent.learn(&[segment])?;
        if iteration % 50 == 0 {
            println!(
                "Iteration {iteration}: loss = {:.4}, lr = {:.4}, grad norm = {:.4}",
                output.loss, output.learning_rate, output.grad_norm
            );
        }
    }

    let path = std::env::temp_dir().join("pgkit-corridor-a2c.json");
    agent.save(&path).await?;
    println!("Saved agent to {}", path.display());
    Ok(())
}
