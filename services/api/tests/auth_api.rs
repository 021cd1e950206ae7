mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{
    app, app_with, get, outsider, request, send, sign_in, student, test_config, FakeIdentity,
    InMemoryDb,
};

const ORIGIN: &str = "https://portal.example.jp";

fn session_id_from(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("session="))
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn callback_without_code_goes_back_to_login() {
    let res = send(app(InMemoryDb::with(|_| {})), get("/auth/callback", None)).await;

    assert_eq!(res.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        res.location(),
        format!("{}/auth/student-login?error=auth_failed", ORIGIN)
    );
}

#[tokio::test]
async fn rejected_code_goes_back_to_login() {
    let db = InMemoryDb::with(|_| {});
    let identity = FakeIdentity::with_code("good", student("taro"));
    let router = app_with(db, identity, test_config());
    let res = send(router, get("/auth/callback?code=bad&next=/student", None)).await;

    assert_eq!(
        res.location(),
        format!("{}/auth/student-login?error=auth_failed", ORIGIN)
    );
}

#[tokio::test]
async fn successful_callback_opens_a_session_and_follows_next() {
    let taro = student("taro");
    let db = InMemoryDb::with(|_| {});
    let identity = FakeIdentity::with_code("abc", taro.clone());
    let router = app_with(db.clone(), identity, test_config());

    let res = send(router, get("/auth/callback?code=abc&next=/student/payments", None)).await;

    assert_eq!(res.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(res.location(), format!("{}/student/payments", ORIGIN));
    let cookie = res.set_cookie();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains(&format!("Max-Age={}", 30 * 24 * 60 * 60)));
    assert!(db.has_session(&session_id_from(cookie)));
}

#[tokio::test]
async fn student_area_refuses_other_domains() {
    let db = InMemoryDb::with(|_| {});
    let identity = FakeIdentity::with_code("abc", outsider());
    let router = app_with(db.clone(), identity, test_config());

    let res = send(router, get("/auth/callback?code=abc&next=/student", None)).await;

    assert_eq!(
        res.location(),
        format!("{}/auth/student-login?error=invalid_domain", ORIGIN)
    );
    assert!(res.set_cookie().is_empty());
    assert!(db.store.lock().unwrap().sessions.is_empty());
}

#[tokio::test]
async fn other_domains_may_sign_in_outside_the_student_area() {
    let db = InMemoryDb::with(|_| {});
    let identity = FakeIdentity::with_code("abc", outsider());
    let router = app_with(db, identity, test_config());

    let res = send(router, get("/auth/callback?code=abc&next=/apply", None)).await;
    assert_eq!(res.location(), format!("{}/apply", ORIGIN));
}

#[tokio::test]
async fn off_site_next_falls_back_to_root() {
    let db = InMemoryDb::with(|_| {});
    let identity = FakeIdentity::with_code("abc", student("taro"));
    let router = app_with(db, identity, test_config());

    let res = send(
        router,
        get("/auth/callback?code=abc&next=https://evil.example/", None),
    )
    .await;
    assert_eq!(res.location(), format!("{}/", ORIGIN));
}

#[tokio::test]
async fn forwarded_host_is_used_outside_development() {
    let request = |host: &str| {
        Request::builder()
            .uri("/auth/callback?code=abc&next=/student")
            .header("x-forwarded-host", host)
            .body(Body::empty())
            .unwrap()
    };

    let identity = FakeIdentity::with_code("abc", student("taro"));
    let router = app_with(InMemoryDb::with(|_| {}), identity, test_config());
    let res = send(router, request("juku.example.jp")).await;
    assert_eq!(res.location(), "https://juku.example.jp/student");

    let mut config = test_config();
    config.development = true;
    let identity = FakeIdentity::with_code("abc", student("taro"));
    let router = app_with(InMemoryDb::with(|_| {}), identity, config);
    let res = send(router, request("juku.example.jp")).await;
    assert_eq!(res.location(), format!("{}/student", ORIGIN));
}

#[tokio::test]
async fn session_endpoint_reports_the_signed_in_student() {
    let taro = student("taro");
    let mut cookie = String::new();
    let db = InMemoryDb::with(|store| cookie = sign_in(store, &taro));

    let res = send(app(db.clone()), get("/auth/session", Some(&cookie))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["email"], taro.email);
    assert_eq!(res.body["userId"], taro.user_id.to_string());

    let res = send(app(db), get("/auth/session", None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error(), "ログインが必要です。");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let taro = student("taro");
    let mut cookie = String::new();
    let db = InMemoryDb::with(|store| cookie = sign_in(store, &taro));

    let res = send(
        app(db.clone()),
        request(Method::POST, "/auth/logout", None, Some(&cookie)),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookie().contains("Max-Age=0"));
    assert!(!db.has_session(&session_id_from(&cookie)));

    let res = send(app(db), get("/auth/session", Some(&cookie))).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
