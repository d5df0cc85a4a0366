// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read `Testcase` rows out of a JUnit document.

use crate::{Failure, ReadError, Testcase};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{fmt, io::BufRead, time::Duration};

static TESTCASE_TAG: &[u8] = b"testcase";
static FAILURE_TAG: &[u8] = b"failure";

/// Returns an iterator over the test cases in the JUnit document read from `reader`.
///
/// The document is read incrementally, so rows are yielded as soon as their closing tag is seen. After
/// the first error, the iterator is fused and returns `None`.
pub fn read_testcases<R: BufRead>(reader: R) -> TestcaseReader<R> {
    TestcaseReader::new(reader)
}

/// A streaming reader over the `testcase` elements of a JUnit document.
///
/// Created by [`read_testcases`].
pub struct TestcaseReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    current: Option<Testcase>,
    in_failure: bool,
    done: bool,
}

impl<R> fmt::Debug for TestcaseReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestcaseReader")
            .field("position", &self.reader.buffer_position())
            .field("current", &self.current)
            .field("in_failure", &self.in_failure)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> TestcaseReader<R> {
    /// Creates a new reader over the given input.
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            current: None,
            in_failure: false,
            done: false,
        }
    }

    fn next_testcase(&mut self) -> Result<Option<Testcase>, ReadError> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|inner| ReadError::Xml {
                    position: self.reader.buffer_position(),
                    inner,
                })?;
            let position = self.reader.buffer_position();

            match event {
                Event::Start(start) if start.local_name().as_ref() == TESTCASE_TAG => {
                    self.current = Some(parse_testcase(&start, position)?);
                    self.in_failure = false;
                }
                Event::Empty(start) if start.local_name().as_ref() == TESTCASE_TAG => {
                    return parse_testcase(&start, position).map(Some);
                }
                Event::Start(start) if start.local_name().as_ref() == FAILURE_TAG => {
                    if let Some(testcase) = &mut self.current {
                        testcase.set_failure(parse_failure(&start, position)?);
                        self.in_failure = true;
                    }
                }
                Event::Empty(start) if start.local_name().as_ref() == FAILURE_TAG => {
                    if let Some(testcase) = &mut self.current {
                        testcase.set_failure(parse_failure(&start, position)?);
                    }
                }
                Event::Text(text) if self.in_failure => {
                    let text = text
                        .unescape()
                        .map_err(|inner| ReadError::Xml { position, inner })?;
                    push_description(&mut self.current, &text);
                }
                Event::CData(data) if self.in_failure => {
                    let data = data.into_inner();
                    push_description(&mut self.current, &String::from_utf8_lossy(&data));
                }
                Event::End(end) if end.local_name().as_ref() == FAILURE_TAG => {
                    self.in_failure = false;
                }
                Event::End(end) if end.local_name().as_ref() == TESTCASE_TAG => {
                    self.in_failure = false;
                    if let Some(testcase) = self.current.take() {
                        return Ok(Some(testcase));
                    }
                }
                Event::Eof => {
                    self.done = true;
                    return match self.current.take() {
                        Some(testcase) => Err(ReadError::UnexpectedEof {
                            classname: testcase.classname,
                            name: testcase.name,
                        }),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for TestcaseReader<R> {
    type Item = Result<Testcase, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_testcase() {
            Ok(Some(testcase)) => Some(Ok(testcase)),
            Ok(None) => None,
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

fn parse_testcase(start: &BytesStart<'_>, position: usize) -> Result<Testcase, ReadError> {
    let mut classname = None;
    let mut name = None;
    let mut file = None;
    let mut line = None;
    let mut time = None;

    for attr in start.attributes() {
        let attr = attr.map_err(|error| ReadError::Xml {
            position,
            inner: error.into(),
        })?;
        let value = attr
            .unescape_value()
            .map_err(|inner| ReadError::Xml { position, inner })?;
        match attr.key.as_ref() {
            b"classname" => classname = Some(value.into_owned()),
            b"name" => name = Some(value.into_owned()),
            b"file" => file = Some(value.into_owned()),
            b"line" => line = Some(value.into_owned()),
            b"time" => time = parse_time(&value),
            _ => {}
        }
    }

    let classname = classname.ok_or(ReadError::MissingAttribute {
        position,
        attribute: "classname",
    })?;
    let name = name.ok_or(ReadError::MissingAttribute {
        position,
        attribute: "name",
    })?;

    let mut testcase = Testcase::new(classname, name);
    if let Some(file) = file {
        testcase.set_location(file, line);
    } else {
        // A line without a file is kept for completeness.
        testcase.line = line;
    }
    if let Some(time) = time {
        testcase.set_time(time);
    }
    Ok(testcase)
}

fn parse_failure(start: &BytesStart<'_>, position: usize) -> Result<Failure, ReadError> {
    let mut failure = Failure::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|error| ReadError::Xml {
            position,
            inner: error.into(),
        })?;
        let value = attr
            .unescape_value()
            .map_err(|inner| ReadError::Xml { position, inner })?;
        match attr.key.as_ref() {
            b"message" => {
                failure.set_message(value.into_owned());
            }
            b"type" => {
                failure.set_type(value.into_owned());
            }
            _ => {}
        }
    }
    Ok(failure)
}

fn push_description(current: &mut Option<Testcase>, text: &str) {
    let Some(failure) = current.as_mut().and_then(|testcase| testcase.failure.as_mut()) else {
        return;
    };
    match &mut failure.description {
        Some(description) => description.push_str(text),
        None => {
            failure.set_description(text);
        }
    }
}

/// Parses the `time` attribute, which is a (possibly fractional) number of seconds.
fn parse_time(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
