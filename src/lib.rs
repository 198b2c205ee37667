pub mod client;
pub mod config;
pub mod distribution;
pub mod error;
pub mod logging;
pub mod media;
pub mod playlist;
pub mod power;
pub mod protocol;
pub mod sync;
pub mod watcher;
pub mod web;

pub mod state {
    use crate::{
        config::AppConfig, distribution::DistributionHandle, playlist::PlaylistHandle, power::PowerHandle,
        sync::Synchronizer,
    };
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct AppState {
        pub config: Arc<AppConfig>,
        pub playlist: PlaylistHandle,
        pub distribution: DistributionHandle,
        pub power: PowerHandle,
        pub synchronizer: Synchronizer,
    }
}
