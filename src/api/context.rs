//
//  atlassian-rest
//  api/context.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Request Context
//!
//! Every request issued through the [`Client`](crate::api::Client) carries a
//! [`Context`]. A context bundles a cancellation signal with an optional
//! deadline so that a blocked network call (including an OAuth2 token refresh
//! performed on the request's behalf) can be abandoned promptly.
//!
//! Contexts form a tree: cancelling a parent cancels every child derived from
//! it via [`Context::child`], [`Context::with_timeout`] or
//! [`Context::with_deadline`], while cancelling a child leaves the parent
//! untouched.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use atlassian_rest::api::Context;
//!
//! let root = Context::background();
//! let ctx = root.with_timeout(Duration::from_secs(30));
//!
//! assert!(ctx.deadline().is_some());
//! root.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason a context stopped a request before it completed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context (or one of its ancestors) was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The context deadline passed before the operation finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline scope for a single logical call.
///
/// Cloning a context is cheap and the clone shares the same cancellation
/// signal and deadline.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Creates a root context that is never cancelled on its own and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child context sharing this context's deadline.
    ///
    /// Cancelling the child does not cancel `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context that expires `timeout` from now.
    ///
    /// If this context already has an earlier deadline, the earlier one wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context that expires at `deadline`.
    ///
    /// If this context already has an earlier deadline, the earlier one wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once this context or an ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| deadline <= Instant::now())
            .unwrap_or(false)
    }

    /// Returns the reason this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.is_expired() {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// The underlying cancellation token, for callers integrating with other
    /// `tokio-util` aware code.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drives `future` to completion unless the context is cancelled or its
    /// deadline passes first, in which case `future` is dropped.
    ///
    /// A context that is already done never polls `future`.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}
