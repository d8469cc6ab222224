//! Transport seam
//!
//! The engine only ever talks to a [`Transport`]. Futures are not `Send`:
//! everything runs on a single-threaded local executor, and dropping the
//! future cancels the exchange.

use crate::{NetError, Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// Boxed, non-`Send` response future
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response, NetError>>>>;

/// Something that can carry a request to a server
pub trait Transport {
    fn send(&self, request: Request) -> ResponseFuture;
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn send(&self, request: Request) -> ResponseFuture {
        (**self).send(request)
    }
}
