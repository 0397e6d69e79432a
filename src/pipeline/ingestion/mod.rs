// Network access shared by every adapter and the enricher

pub mod fetcher;
