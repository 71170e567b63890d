//! Artifact transfer around scripts
//!
//! Each artifact is a tarball kept at a remote location. Before the script
//! runs, an existing archive is downloaded and extracted into the working
//! directory; after it succeeds, the files matching the artifact's path are
//! packed and uploaded again. Transfers shell out to `aws s3 cp`, so the
//! wrapped script must run in a POSIX shell.

use crate::config::Artifact;
use crate::error::Result;
use crate::runner::ExecutionContext;

/// Surround `script` with the download and upload commands of `artifacts`
pub fn wrap_script(
    ctx: &ExecutionContext<'_>,
    script: &str,
    artifacts: &[Artifact],
    template_name: &str,
) -> Result<String> {
    let mut setup = Vec::new();
    let mut teardown = Vec::new();

    for artifact in artifacts {
        let via = quote(&ctx.render(&artifact.via, template_name)?);
        let archive = quote(&format!("/tmp/variant-artifact-{}.tgz", artifact.name));

        setup.push(format!(
            "if aws s3 ls {via} >/dev/null 2>&1; then\n  \
             aws s3 cp --quiet {via} {archive} && tar xzf {archive} && rm -f {archive} || exit 1\n\
             fi"
        ));
        teardown.push(format!(
            "tar czf {archive} {path} && aws s3 cp --quiet {archive} {via} && rm -f {archive} || exit 1",
            path = artifact.path,
        ));
    }

    Ok(format!(
        "{setup}\n(\n{script}\n)\nstatus=$?\nif [ $status -ne 0 ]; then exit $status; fi\n{teardown}\n",
        setup = setup.join("\n"),
        teardown = teardown.join("\n"),
    ))
}

/// Single-quote `s` for the shell
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Application;
    use crate::config::Settings;
    use crate::task::TaskName;
    use serde_json::json;

    #[test]
    fn test_wrap_script() {
        let app = Application::from_yaml("app", "tasks:\n  build:\n    script: make\n", Settings::new("app"))
            .unwrap();
        let task = app.registry.find_task(&TaskName::parse("app.build")).unwrap();
        let ctx = ExecutionContext::new(&app, task, json!({"env": "prod"}), vec![], false);
        let artifacts = vec![Artifact {
            name: "out".to_string(),
            path: "dist".to_string(),
            via: "s3://bucket/{{ .env }}/out.tgz".to_string(),
        }];

        let wrapped = wrap_script(&ctx, "make dist", &artifacts, "build").unwrap();
        let download = wrapped
            .find("aws s3 cp --quiet 's3://bucket/prod/out.tgz' '/tmp/variant-artifact-out.tgz'")
            .unwrap();
        let script = wrapped.find("(\nmake dist\n)").unwrap();
        let upload = wrapped
            .find("tar czf '/tmp/variant-artifact-out.tgz' dist && aws s3 cp --quiet '/tmp/variant-artifact-out.tgz' 's3://bucket/prod/out.tgz'")
            .unwrap();
        assert!(wrapped.starts_with("if aws s3 ls 's3://bucket/prod/out.tgz'"));
        assert!(download < script && script < upload);
        assert!(wrapped.contains("if [ $status -ne 0 ]; then exit $status; fi"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("s3://bucket/a b"), "'s3://bucket/a b'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
