mod episode;
mod link;
mod season;
mod show;

pub use episode::Episode;
pub use link::{ExternalLink, LinkKind, LinkRecord, DEFAULT_MEDIA_KIND};
pub use season::Season;
pub use show::Show;
