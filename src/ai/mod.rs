pub mod providers;
pub mod retry;

pub use providers::{
    create_provider, GoogleProvider, HttpProviderFactory, OpenAiCompatProvider, ProviderError,
    ProviderFactory, ProviderReply, ReviewProvider, ReviewRequest,
};
pub use retry::{Backoff, RetryPolicy};
