//! Compound source backed by `PubChem` for structures and similarity, and by
//! the chat model for therapeutic-class enumeration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::chat::ChatClient;
use crate::adapters::pubchem::PubChemClient;
use crate::domain::errors::DomainResult;
use crate::domain::ports::{CompoundRecord, CompoundSource};

pub struct PipelineCompounds {
    pubchem: Arc<PubChemClient>,
    chat: Arc<ChatClient>,
}

impl PipelineCompounds {
    pub const fn new(pubchem: Arc<PubChemClient>, chat: Arc<ChatClient>) -> Self {
        Self { pubchem, chat }
    }
}

#[async_trait]
impl CompoundSource for PipelineCompounds {
    async fn lookup(&self, name: &str) -> DomainResult<Option<CompoundRecord>> {
        self.pubchem.lookup(name).await
    }

    async fn similar(&self, seed_key: &str, limit: usize) -> DomainResult<Vec<CompoundRecord>> {
        self.pubchem.similar(seed_key, limit).await
    }

    async fn enumerate_class(
        &self,
        class_name: &str,
        exclude: &[String],
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        self.chat.enumerate_class(class_name, exclude, limit).await
    }
}
