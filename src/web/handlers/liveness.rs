use salvo::prelude::*;

pub const LIVENESS_BODY: &str = "Bot is alive!";

#[handler]
pub async fn alive(res: &mut Response) {
    res.render(Text::Plain(LIVENESS_BODY));
}

#[cfg(test)]
mod tests {
    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};

    use super::LIVENESS_BODY;
    use crate::web::create_router;

    #[tokio::test]
    async fn root_reports_alive() {
        let service = Service::new(create_router());

        let mut res = TestClient::get("http://127.0.0.1:10000/")
            .send(&service)
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        let body = res.take_string().await.expect("response body");
        assert_eq!(body, LIVENESS_BODY);
    }
}
