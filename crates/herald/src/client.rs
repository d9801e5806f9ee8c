// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse, StreamChunk};
use std::pin::Pin;
use std::task::{Context, Poll};
use uuid::Uuid;

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse>;

    async fn send_streaming_request(&self, request: ProviderRequest)
        -> LLMResult<FragmentStream>;

    fn provider_name(&self) -> &'static str;
}

/// A lazy, finite, single-consumption sequence of response fragments.
///
/// The producer never waits on the consumer: fragments are pulled when the
/// caller asks for the next one, so pacing and display belong to the caller.
/// Once the stream reports an error or its final chunk it stays exhausted.
pub struct FragmentStream {
    inner: BoxStream<'static, LLMResult<StreamChunk>>,
    finished: bool,
}

impl FragmentStream {
    pub fn new<S>(chunks: S) -> Self
    where
        S: Stream<Item = LLMResult<StreamChunk>> + Send + 'static,
    {
        Self {
            inner: chunks.boxed(),
            finished: false,
        }
    }

    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let request_id = Uuid::new_v4();
        Self::new(stream::iter(
            fragments
                .into_iter()
                .map(move |fragment| Ok(StreamChunk::delta(request_id, fragment))),
        ))
    }

    pub async fn next_fragment(&mut self) -> Option<LLMResult<String>> {
        StreamExt::next(self).await
    }

    /// Drains the stream into one string, stopping at the first error.
    pub async fn collect_text(mut self) -> LLMResult<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for FragmentStream {
    type Item = LLMResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        loop {
            match self.inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_final {
                        self.finished = true;
                        if chunk.content_delta.is_empty() {
                            return Poll::Ready(None);
                        }
                        return Poll::Ready(Some(Ok(chunk.content_delta)));
                    }
                    if !chunk.content_delta.is_empty() {
                        return Poll::Ready(Some(Ok(chunk.content_delta)));
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
