//! Video platform: channel/playlist listings, comment threads and ratings.

mod api_types;
mod cache;
mod comments;
mod types;
mod videos;

pub use cache::{comment_prefix, YoutubeQueryKey};
pub use comments::CommentFacade;
pub use types::{Comment, Rating, SourceType, Video};
pub use videos::VideoFacade;
