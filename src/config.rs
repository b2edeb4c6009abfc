use std::time::Duration;

use clap::Parser;

use crate::tournament::TreeGeometry;

/// Forms a tournament group and has every participant take its critical
/// section in turn.
#[derive(Debug, Clone, Parser)]
#[command(name = "tournament", version)]
pub struct DriverConfig {
    /// Number of participants (power of two, at most 16)
    #[arg(env = "TOURNAMENT_PARTICIPANTS", value_parser = parse_participants)]
    pub participants: usize,

    /// Time each participant spends inside the critical section
    #[arg(long, env = "TOURNAMENT_HOLD_MS", default_value_t = 1000)]
    pub hold_ms: u64,

    /// Upper bound of a random extra hold time
    #[arg(long, env = "TOURNAMENT_JITTER_MS", default_value_t = 0)]
    pub jitter_ms: u64,

    /// How many times each participant enters
    #[arg(long, env = "TOURNAMENT_ROUNDS", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rounds: u32,
}

impl DriverConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

fn parse_participants(raw: &str) -> Result<usize, String> {
    let n: usize = raw
        .parse()
        .map_err(|e| format!("not a participant count: {e}"))?;
    TreeGeometry::new(n).map_err(|e| e.to_string())?;
    Ok(n)
}
