//! Makes sure the execution image is available before a sandbox is created.

use tracing::{debug, info};

use super::{ContainerRuntime, SandboxError};

/// Checks that `image` exists locally and pulls it if it does not.
///
/// Any failure here happens before a container exists, so callers can abort
/// without teardown.
pub(crate) async fn ensure_image(
    runtime: &dyn ContainerRuntime,
    image: &str,
) -> Result<(), SandboxError> {
    let image = qualified_name(image);

    if runtime.inspect_image(&image).await?.is_some() {
        debug!("Image {} present locally", image);
        return Ok(());
    }

    info!("Image {} not found locally, pulling", image);
    runtime.pull_image(&image).await
}

/// Parse image name and tag from a string.
///
/// A colon followed by a path segment belongs to a registry port, not a tag.
pub(crate) fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rfind(':') {
        Some(colon_pos) if !image[colon_pos + 1..].contains('/') => {
            (&image[..colon_pos], &image[colon_pos + 1..])
        }
        _ => (image, "latest"),
    }
}

/// Returns `name:tag`, defaulting the tag to `latest`.
pub(crate) fn qualified_name(image: &str) -> String {
    let (name, tag) = parse_image_tag(image);
    format!("{name}:{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::{Call, MockBehavior, MockRuntime};

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(parse_image_tag("python:3.11"), ("python", "3.11"));
        assert_eq!(
            parse_image_tag("myregistry/python:slim"),
            ("myregistry/python", "slim")
        );
        assert_eq!(
            parse_image_tag("registry.example.com:5000/python:dev"),
            ("registry.example.com:5000/python", "dev")
        );
    }

    #[test]
    fn test_parse_image_no_tag() {
        assert_eq!(parse_image_tag("python"), ("python", "latest"));
        assert_eq!(
            parse_image_tag("registry:5000/python"),
            ("registry:5000/python", "latest")
        );
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("python"), "python:latest");
        assert_eq!(qualified_name("python:3.11"), "python:3.11");
    }

    #[tokio::test]
    async fn test_present_image_is_not_pulled() {
        let runtime = MockRuntime::new(MockBehavior::default());
        ensure_image(runtime.as_ref(), "python:3.11").await.unwrap();

        assert_eq!(
            runtime.calls(),
            vec![Call::InspectImage("python:3.11".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled() {
        let runtime = MockRuntime::new(MockBehavior {
            image_present: false,
            ..Default::default()
        });

        ensure_image(runtime.as_ref(), "python").await.unwrap();
        assert_eq!(
            runtime.calls(),
            vec![
                Call::InspectImage("python:latest".to_string()),
                Call::PullImage("python:latest".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_failure_is_provisioning_error() {
        let runtime = MockRuntime::new(MockBehavior {
            image_present: false,
            fail_pull: true,
            ..Default::default()
        });

        let err = ensure_image(runtime.as_ref(), "python:3.11")
            .await
            .unwrap_err();
        assert!(err.is_provisioning());
        assert!(err.to_string().contains("manifest unknown"));
        assert_eq!(runtime.created_count(), 0);
    }
}
