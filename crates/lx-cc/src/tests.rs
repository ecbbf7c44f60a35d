use super::*;

#[test]
fn scan_invocation_arg_order() {
    let mut config = CompilerConfig::new("cl.exe");
    config.preprocessor_flags.push("/Iinclude".to_string());
    config.preprocessor_flags.push("/DNDEBUG".to_string());
    config.extra_flags.push("/nologo".to_string());

    let invocation = config.scan_invocation(Utf8Path::new("src/geometry.cpp"));

    assert_eq!(invocation.program, Utf8PathBuf::from("cl.exe"));
    assert_eq!(
        invocation.args,
        vec!["/E", "src/geometry.cpp", "/showIncludes", "/Iinclude", "/DNDEBUG", "/nologo"]
    );
}

#[test]
fn base_flags_stay_out_of_the_scan() {
    let mut config = CompilerConfig::new("cl.exe");
    config.base_flags.push("/Od".to_string());

    let invocation = config.scan_invocation(Utf8Path::new("a.c"));
    assert!(!invocation.args.contains(&"/Od".to_string()));
}

#[test]
fn report_lines_chains_both_streams() {
    let output = ScanOutput {
        exit_code: 0,
        stdout: "preprocessed\n".to_string(),
        stderr: "Note: including file: a.h\n".to_string(),
    };

    let lines: Vec<&str> = output.report_lines().collect();
    assert_eq!(lines, vec!["preprocessed", "Note: including file: a.h"]);
}

#[test]
fn process_scanner_captures_output_and_exit_code() {
    let invocation = ScanInvocation {
        program: "sh".into(),
        args: vec![
            "-c".to_string(),
            "echo 'Note: including file: x.h' >&2; exit 3".to_string(),
        ],
    };

    let output = ProcessScanner.scan(&invocation).unwrap();
    assert_eq!(output.exit_code, 3);
    assert!(!output.success());
    assert_eq!(
        include_report::included_files(output.report_lines()),
        vec!["x.h"]
    );
}

#[test]
fn process_scanner_reports_missing_program() {
    let invocation = ScanInvocation {
        program: "/nonexistent/lynx-test-compiler".into(),
        args: vec![],
    };

    let err = ProcessScanner.scan(&invocation).unwrap_err();
    assert!(matches!(err, ScanError::Spawn { .. }));
}
