use std::fmt;

use crate::error::FeedError;

/// Direction of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadType {
    /// Replace the cache with page 1
    Refresh,
    /// Fetch the page before the cached head
    Prepend,
    /// Fetch the page after the cached tail
    Append,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadType::Refresh => write!(f, "refresh"),
            LoadType::Prepend => write!(f, "prepend"),
            LoadType::Append => write!(f, "append"),
        }
    }
}

/// Result of a load that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSuccess {
    /// Nothing further exists in this direction
    pub end_of_pagination_reached: bool,
    /// Stories received from the remote; zero when no call was made
    pub fetched: usize,
}

impl LoadSuccess {
    pub(crate) fn end_reached() -> Self {
        Self {
            end_of_pagination_reached: true,
            fetched: 0,
        }
    }
}

pub type LoadOutcome = Result<LoadSuccess, FeedError>;

/// Progress of one load type, as shown to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    NotLoading { end_of_pagination_reached: bool },
    Error(FeedError),
}

impl LoadState {
    pub fn idle() -> Self {
        LoadState::NotLoading {
            end_of_pagination_reached: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn error(&self) -> Option<&FeedError> {
        match self {
            LoadState::Error(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn from_outcome(outcome: &LoadOutcome) -> Self {
        match outcome {
            Ok(success) => LoadState::NotLoading {
                end_of_pagination_reached: success.end_of_pagination_reached,
            },
            Err(e) => LoadState::Error(e.clone()),
        }
    }
}

/// Load state for every load type of one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStates {
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
}

impl Default for LoadStates {
    fn default() -> Self {
        Self {
            refresh: LoadState::idle(),
            prepend: LoadState::idle(),
            append: LoadState::idle(),
        }
    }
}

impl LoadStates {
    pub fn get(&self, load_type: LoadType) -> &LoadState {
        match load_type {
            LoadType::Refresh => &self.refresh,
            LoadType::Prepend => &self.prepend,
            LoadType::Append => &self.append,
        }
    }

    pub fn set(&mut self, load_type: LoadType, state: LoadState) {
        match load_type {
            LoadType::Refresh => self.refresh = state,
            LoadType::Prepend => self.prepend = state,
            LoadType::Append => self.append = state,
        }
    }

    pub fn any_loading(&self) -> bool {
        self.refresh.is_loading() || self.prepend.is_loading() || self.append.is_loading()
    }
}

/// Whether a freshly observed feed should start with a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeAction {
    LaunchInitialRefresh,
    SkipInitialRefresh,
}
