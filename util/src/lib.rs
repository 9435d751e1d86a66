use std::{
    fs, io,
    num::ParseIntError,
    path::{Path, PathBuf},
    str::FromStr,
};

use miette::GraphicalReportHandler;
use nom::{
    character::complete::{char, digit1},
    combinator::{map_res, opt, recognize},
    error::{FromExternalError, ParseError},
    sequence::tuple,
    IResult,
};
use nom_locate::LocatedSpan;
use nom_supreme::{
    error::{ErrorTree, GenericErrorTree},
    final_parser::final_parser,
};
use tracing_subscriber::filter::LevelFilter;

// Thanks to FasterThanLime! https://fasterthanli.me/series/advent-of-code-2022/part-11

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(thiserror::Error, Debug, miette::Diagnostic)]
#[error("bad input")]
struct BadInput {
    #[source_code]
    src: String,

    #[label("{kind}")]
    bad_bit: miette::SourceSpan,

    kind: String,
}

#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("unable to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to read standard input")]
    Stdin(#[source] io::Error),
    #[error("unable to parse line:\n{report}")]
    BadLine { report: String },
}

pub fn parse_number<'a, T, E>(i: Span<'a>) -> IResult<Span<'a>, T, E>
where
    T: FromStr<Err = ParseIntError>,
    E: ParseError<Span<'a>> + FromExternalError<Span<'a>, ParseIntError>,
{
    map_res(recognize(tuple((opt(char('-')), digit1))), |i: Span<'a>| {
        i.fragment().parse::<T>()
    })(i)
}

fn locate(e: &ErrorTree<Span>) -> (usize, String) {
    match e {
        GenericErrorTree::Base { location, kind } => (location.location_offset(), kind.to_string()),
        GenericErrorTree::Stack { base, .. } => locate(base),
        GenericErrorTree::Alt(alts) => alts
            .iter()
            .map(locate)
            .max_by_key(|(offset, _)| *offset)
            .unwrap_or_else(|| (0, "no alternative matched".to_string())),
    }
}

/// Runs `parse_fun` over the whole of `l`. On failure the error carries a
/// rendered report with the offending column labelled.
pub fn parse_nice<'a, T, F>(l: &'a str, parse_fun: F) -> Result<T, InputError>
where
    F: FnMut(Span<'a>) -> IResult<Span<'a>, T, ErrorTree<Span<'a>>>,
{
    let line_span = Span::new(l);
    let line: Result<_, ErrorTree<Span>> = final_parser(parse_fun)(line_span);
    line.map_err(|e| {
        let (offset, kind) = locate(&e);
        let err = BadInput {
            src: l.to_string(),
            bad_bit: miette::SourceSpan::new(offset.into(), 0.into()),
            kind,
        };
        let mut report = String::new();
        if GraphicalReportHandler::new()
            .render_report(&mut report, &err)
            .is_err()
        {
            report = format!("{err}: {l}");
        }
        InputError::BadLine { report }
    })
}

pub fn read_input_as_string() -> Result<String, InputError> {
    io::read_to_string(io::stdin().lock()).map_err(InputError::Stdin)
}

pub fn read_input_file(path: impl AsRef<Path>) -> Result<String, InputError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Warnings and errors go to stderr so stdout only carries answers.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::WARN)
        .with_writer(io::stderr)
        .without_time()
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("0", 0)]
    #[case("29116", 29116)]
    #[case("-12", -12)]
    fn signed_numbers(#[case] input: &str, #[case] expected: i64) {
        let res = parse_nice(input, parse_number::<i64, _>);
        assert_eq!(res.unwrap(), expected);
    }

    #[test]
    fn unsigned_rejects_negative() {
        assert!(parse_nice("-12", parse_number::<u64, _>).is_err());
    }

    #[test]
    fn trailing_garbage_is_reported() {
        let res = parse_nice("14848514x", parse_number::<u64, _>);
        match res {
            Err(InputError::BadLine { report }) => assert!(report.contains("bad input")),
            other => panic!("expected a bad line, got {other:?}"),
        }
    }

    #[test]
    fn missing_file() {
        let res = read_input_file("this/file/does/not/exist.txt");
        assert!(matches!(res, Err(InputError::Read { .. })));
    }
}
