use thiserror::Error;

/// Error taxonomy for a demultiplexing run.
///
/// Configuration errors are fatal at startup and never retried. I/O errors
/// terminate the owning feed's background thread and surface when the feed is
/// joined. Corrupt records are recoverable per policy. Classification
/// ambiguity is not an error at all; it routes to the unclassified bucket.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration{}.", Error::format_msg_as_detail(msg))]
    Config { msg: Option<String> },

    #[error("I/O failure while {}: {}", context, source)]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record '{}'{}.", name, Error::format_msg_as_detail(msg))]
    CorruptRecord { name: String, msg: Option<String> },

    #[error("Feed '{}' background thread died: {}", feed, msg)]
    DeadFeed { feed: String, msg: String },
}

impl Error {
    #[cold]
    pub fn config<M: Into<String>>(msg: M) -> Self {
        Error::Config {
            msg: Some(msg.into()),
        }
    }

    #[cold]
    pub fn io_error<C: Into<String>>(context: C, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    #[cold]
    pub fn corrupt_record<N: Into<String>, M: Into<String>>(name: N, msg: Option<M>) -> Self {
        Error::CorruptRecord {
            name: name.into(),
            msg: msg.map(|m| m.into()),
        }
    }

    #[cold]
    pub fn dead_feed<F: Into<String>, M: Into<String>>(feed: F, msg: M) -> Self {
        Error::DeadFeed {
            feed: feed.into(),
            msg: msg.into(),
        }
    }

    pub fn format_msg_as_detail(msg: &Option<String>) -> String {
        match msg {
            Some(m) => format!(" ({})", m),
            None => String::new(),
        }
    }
}
