// src/socket/patterns/mod.rs

pub(crate) mod distributor;
pub(crate) mod fair_queue;
pub(crate) mod trie;

pub(crate) use distributor::Distributor;
pub(crate) use fair_queue::FairQueue;
pub(crate) use trie::SubscriptionTrie;
