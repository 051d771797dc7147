use http::{header, Method};

use crate::client::test::scenario::Scenario;
use crate::Error;

#[test]
fn prepare_inspects_target() {
    let scenario = Scenario::builder().get("q.test/path").build();
    let flow = scenario.to_prepare();

    assert_eq!(flow.method(), Method::GET);
    assert_eq!(flow.uri().to_string(), "http://q.test/path");
    assert_eq!(flow.target().port(), 80);
}

#[test]
fn prepare_bad_header() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_prepare();

    let err = flow.header("bad header", "x").unwrap_err();
    assert!(matches!(err, Error::BadHeader(_)));

    let err = flow.header(header::USER_AGENT, "very\nbad").unwrap_err();
    assert!(matches!(err, Error::BadHeader(_)));
}
