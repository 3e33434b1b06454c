//! Resolution of Instagram posts into downloadable media

pub mod extractor;
pub mod fetch;
pub mod resolver;

pub use extractor::{Extractor, MediaDescriptor, YtDlpExtractor};
pub use resolver::{ResolvedMedia, Resolver, ResolverSettings};
