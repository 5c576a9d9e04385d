pub mod callback;
pub mod config;
pub mod error;
pub mod external;
pub mod generate;
pub mod parse;
pub mod password;
pub mod queue;
pub mod resolve;
pub mod resource;
pub mod store;
pub mod versions;

pub use error::{HandleError, HashError, QueueError, Result, HashResult};
pub use config::{HandleConfig, PasswordConfig, ExternalConfig, WorkQueueConfig};
pub use resource::{ResourceType, ResourceRef, HandleTarget, Resource};
pub use parse::{ParsedHandle, HandleParser, parse_parts, compose, is_valid_handle_format};
pub use versions::{versioned_handle, is_versioned_handle, base_handle, preferred_handle};
pub use generate::HandleMinter;
pub use store::{HandleRecord, HandleStore, MemoryHandleStore};
pub use resolve::{HandleResolver, LocalHandleResolver};
pub use external::{ExternalHandleResolver, HandleServerClient, HttpHandleClient, HandleValue, Credentials, SecretKey};
pub use callback::{IdentifierServiceCallback, ProviderRules, ProviderSelection, CollectionCallback};
pub use password::PasswordHash;
pub use password::record::PasswordHashRecord;
pub use password::salt::SaltGenerator;
pub use password::simple::{DigestAlgorithm, SimplePasswordHash};
pub use password::kdf::Pbkdf2PasswordHash;
pub use password::factory::{PasswordHashFactory, SimplePasswordHashFactory, Pbkdf2PasswordHashFactory};
pub use password::service::PasswordHashService;
pub use queue::{WorkQueue, Worker, TaskArgs, TaskHandle, TaskOutcome, AssignIdentifierWorker};
