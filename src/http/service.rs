use super::{reason_phrase, Router};
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};
use std::sync::Arc;

/// `may_minihttp` service; one clone per connection, all sharing the router.
#[derive(Clone)]
pub struct VendstockService {
    router: Arc<Router>,
}

impl VendstockService {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }
}

impl HttpService for VendstockService {
    fn call(&mut self, req: Request, rsp: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let path = req.path().to_string();
        let mut body = Vec::new();
        req.body().read_to_end(&mut body)?;

        let response = self.router.dispatch(&method, &path, &body);

        rsp.status_code(usize::from(response.status), reason_phrase(response.status));
        rsp.header(response.content_type);
        rsp.body_vec(response.body);
        Ok(())
    }
}
