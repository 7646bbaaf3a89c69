/// Configuration for the [Actor](super::Actor).
#[derive(Clone, Debug)]
pub struct Config {
    /// The maximum size of the mailbox backlog.
    pub mailbox_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { mailbox_size: 1024 }
    }
}
