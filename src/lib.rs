pub mod checkpoint;
pub mod clip;
pub mod config;
pub mod error;
pub mod features;
pub mod gym;
pub mod market;
pub mod networks;
pub mod objective;
pub mod policy;

pub use checkpoint::{config_checkpoint_name, config_hash, Checkpointer};
pub use clip::{ActionClip, ClipMode};
pub use config::{ClipConfig, GymConfig};
pub use error::{GymError, Result};
pub use features::{FeatureSet, NormalizedFeatures, PathFeature, StepFeature};
pub use gym::{HedgeGym, RolloutResult};
pub use market::MarketPath;
pub use networks::{
    FeedForwardPolicy, FeedForwardPolicyConfig, FeedForwardPolicyFactory, RecurrentPolicy,
    RecurrentPolicyConfig, RecurrentPolicyFactory, RECURRENT_STATE_FEATURE,
};
pub use objective::{
    EntropicUtility, EntropicUtilityFactory, MeanUtility, MeanUtilityFactory, Utility,
    UtilityFactory,
};
pub use policy::{Features, Policy, PolicyFactory, RecurrentState};
