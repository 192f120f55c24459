//! comma-cli 集成测试

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cli() -> Command {
    Command::cargo_bin("comma-cli").unwrap()
}

/// to-bin 后 from-bin 还原原始文本
#[test]
fn test_to_bin_from_bin_roundtrip() {
    let input = "0,-1,-2,1.123,2.345,3.678\n1,10,-20,4.5,5.25,6.125\n";

    let to_bin = cli()
        .args(["to-bin", "--format", "%ui%2w%3d"])
        .write_stdin(input)
        .assert()
        .success();
    let binary = to_bin.get_output().stdout.clone();
    assert_eq!(binary.len(), 2 * 32);

    cli()
        .args(["from-bin", "--format", "%ui%2w%3d"])
        .write_stdin(binary)
        .assert()
        .success()
        .stdout(input);
}

/// info 打印大小与布局
#[test]
fn test_info() {
    cli()
        .args(["info", "--format", "%ui%2w%3d"])
        .assert()
        .success()
        .stdout(predicate::str::contains("size: 32 bytes"))
        .stdout(predicate::str::contains("count: 6 fields"))
        .stdout(predicate::str::contains("0,0,4,ui"))
        .stdout(predicate::str::contains("3,8,8,d"));
}

/// 非法描述符报错退出
#[test]
fn test_bad_descriptor() {
    cli()
        .args(["info", "--format", "%s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("format descriptor"));
}

/// 文件输入输出与配置文件
#[test]
fn test_files_and_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("csv.toml");
    let input_path = dir.path().join("in.csv");
    let bin_path = dir.path().join("out.bin");

    std::fs::write(&config_path, "format = \"2uw\"\ndelimiter = \";\"\n").unwrap();
    let mut input = std::fs::File::create(&input_path).unwrap();
    writeln!(input, "1;2").unwrap();
    writeln!(input, "3;4").unwrap();
    drop(input);

    cli()
        .args([
            "to-bin",
            "--config",
            config_path.to_str().unwrap(),
            input_path.to_str().unwrap(),
            "-o",
            bin_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let binary = std::fs::read(&bin_path).unwrap();
    assert_eq!(binary.len(), 8);

    // 显式参数覆盖配置文件的分隔符
    cli()
        .args([
            "from-bin",
            "--config",
            config_path.to_str().unwrap(),
            "--delimiter",
            ",",
            bin_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout("1,2\n3,4\n");
}

/// 结尾的半条记录是独立的错误条件
#[test]
fn test_short_read() {
    cli()
        .args(["from-bin", "--format", "ui"])
        .write_stdin(vec![1u8, 2, 3])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Short read"));
}
