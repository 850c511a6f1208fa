//! Example: REINFORCE on CartPole created through the environment registry

use pgkit_agent::{Agent, AgentConfig, LinearPolicyConfig, LinearSoftmaxPolicy, ReinforceAgent, TrajectoryRunner};
use pgkit_env::{make_env, EnvironmentConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let env_config = EnvironmentConfig {
        seed: Some(0),
        max_steps: Some(200),
        ..EnvironmentConfig::default()
    };
    let mut env = make_env("CartPole", &env_config)?;

    let policy = LinearSoftmaxPolicy::new(LinearPolicyConfig {
        obs_dim: 4,
        num_actions: 2,
        use_value_head: false,
        init_scale: 0.01,
        seed: Some(0),
    })?;
    let config = AgentConfig {
        learning_rate: 0.01,
        ..AgentConfig::default()
    };
    let mut agent = ReinforceAgent::new(Box::new(policy), config)?;
    let runner = TrajectoryRunner::new(200);
    let mut rng = StdRng::seed_from_u64(0);

    for iteration in 0..100 {
        let trajectories = runner.run(&agent, &mut env, 10, &mut rng)?;
        let mean_return =
            trajectories.iter().map(|t| t.total_reward).sum::<f64>() / trajectories.len() as f64;
        let output = agent.learn(&trajectories)?;
        if iteration % 10 == 0 {
            println!("Iteration {iteration}: mean return = {mean_return:.1}, loss = {:.4}", output.loss);
        }
    }
    Ok(())
}
