pub mod article;
pub mod rss;
