use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Process-wide sequence so ids stay distinct across correlator instances.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Correlation id carried by every event of one generation session.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Mints session ids and remembers which one is active.
///
/// The active id is the only one the router admits. Clearing it makes every
/// event still in flight for the old session inert.
#[derive(Debug, Default)]
pub struct Correlator {
    current: Option<SessionId>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id (`job_<millis>_<seq>_<suffix>`) and make it current.
    pub fn mint(&mut self) -> SessionId {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = SessionId(format!("job_{millis}_{seq}_{}", random_suffix()));
        self.current = Some(id.clone());
        id
    }

    pub fn current(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    pub fn is_current(&self, id: &SessionId) -> bool {
        self.current.as_ref() == Some(id)
    }

    /// Forget the active id.
    pub fn clear(&mut self) -> Option<SessionId> {
        self.current.take()
    }

    /// Put back the id that was current before a mint that never took
    /// effect. The minted id becomes inert.
    pub fn restore(&mut self, previous: Option<SessionId>) {
        self.current = previous;
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
