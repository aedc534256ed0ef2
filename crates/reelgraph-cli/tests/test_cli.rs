use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("reelgraph").unwrap()
}

fn write_dataset(dir: &Path) {
    let mut ratings = String::from("userId,movieId,rating\n");
    for user in 1..=6u32 {
        for movie in 1..=6u32 {
            let rating = 1.0 + ((user * 2 + movie * 3) % 9) as f32 * 0.5;
            ratings.push_str(&format!("{user},{movie},{rating:.1}\n"));
        }
    }
    fs::write(dir.join("ratings.csv"), ratings).unwrap();
    fs::write(
        dir.join("movies.csv"),
        "movieId,title,genres\n\
         1,First (2001),Action|Crime\n\
         2,Second (2002),Drama\n\
         3,Third (2003),Action\n\
         4,Fourth (2004),(no genres listed)\n\
         5,Fifth (2005),Comedy|Drama\n\
         6,Sixth (2006),Crime\n",
    )
    .unwrap();
}

fn write_config(dir: &Path) {
    let config = format!(
        r#"data:
  ratings: {ratings}
  movies: {movies}
  batch_size: 16
  val_ratio: 0.15
  test_ratio: 0.15
  seed: 3
model:
  num_dim: 4
train:
  epochs: 1
  optimizer:
    type: adamw
    params:
      lr: 0.01
logdir: {logdir}
"#,
        ratings = dir.join("ratings.csv").display(),
        movies = dir.join("movies.csv").display(),
        logdir = dir.join("runs").display(),
    );
    fs::write(dir.join("config.yaml"), config).unwrap();
}

#[test]
fn resume_requires_a_checkpoint() {
    cmd()
        .arg("--resume")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--checkpoint"));
}

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

#[test]
fn trains_and_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    write_config(dir.path());

    cmd()
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("test: loss"));

    let run_dir = dir.path().join("runs").join("train_0");
    assert!(run_dir.join("last.pt").is_file());
    assert!(run_dir.join("best.pt").is_file());
    assert!(run_dir.join("loss_plot.png").is_file());
    assert!(run_dir.join("scalars.jsonl").is_file());
}

#[test]
fn resumes_from_a_checkpoint() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    write_config(dir.path());

    cmd().current_dir(dir.path()).assert().success();

    let last = dir.path().join("runs").join("train_0").join("last.pt");
    cmd()
        .current_dir(dir.path())
        .args(["--checkpoint", last.to_str().unwrap(), "--resume"])
        .assert()
        .success();
}

#[test]
fn warm_start_opens_a_new_run_directory() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    write_config(dir.path());

    cmd().current_dir(dir.path()).assert().success();

    let last = dir.path().join("runs").join("train_0").join("last.pt");
    cmd()
        .current_dir(dir.path())
        .args(["--checkpoint", last.to_str().unwrap()])
        .assert()
        .success();
    assert!(dir.path().join("runs").join("train_1").is_dir());
}

#[test]
fn warm_start_keeps_the_checkpointed_config() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    write_config(dir.path());

    cmd().current_dir(dir.path()).assert().success();

    // No config file in the working directory: the checkpoint's own
    // config drives the warm start.
    fs::remove_file(dir.path().join("config.yaml")).unwrap();
    let last = dir.path().join("runs").join("train_0").join("last.pt");
    cmd()
        .current_dir(dir.path())
        .args(["--checkpoint", last.to_str().unwrap()])
        .assert()
        .success();
    assert!(dir.path().join("runs").join("train_1").is_dir());
}

#[test]
fn missing_checkpoint_is_reported() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    write_config(dir.path());

    cmd()
        .current_dir(dir.path())
        .args(["--checkpoint", "nope.pt", "--resume"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint not found"));
}
