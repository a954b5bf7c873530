//! Wraps learner code into a runnable Python test harness.
//!
//! The learner's top-level functions become instance methods of
//! `StudentCode`; system helpers, the question's auxiliary code and generated
//! test code are placed around it. Every harness line remembers which raw
//! line (if any) it came from so runtime errors can point back at the
//! learner's own code.

use rand::Rng;
use regex::Regex;
use tracing::{debug, instrument};

use crate::domain::Task;
use crate::util::to_python_literal;

pub const CLASS_NAME_STUDENT_CODE: &str = "StudentCode";
pub const CLASS_NAME_AUXILIARY_CODE: &str = "AuxiliaryCode";
pub const SEPARATOR_LENGTH: usize = 80;

pub const VARNAME_OBSERVED_OUTPUTS: &str = "correctness_test_results";
pub const VARNAME_BUGGY_OUTPUT_TEST_RESULTS: &str = "buggy_output_test_results";
pub const VARNAME_PERFORMANCE_TEST_RESULTS: &str = "performance_test_results";
pub const VARNAME_MOST_RECENT_INPUT: &str = "most_recent_input";
const VARNAME_ALL_TASKS_TEST_INPUTS: &str = "all_tasks_test_inputs";
const VARNAME_TASK_BUGGY_OUTPUT_TEST_RESULTS: &str = "task_buggy_output_test_results";
const VARNAME_TASK_PERFORMANCE_TEST_RESULTS: &str = "task_performance_test_results";

const START_INDENT: &str = "    ";
const SMALL_INPUT_SIZE: u32 = 10;
const LARGE_INPUT_SIZE: u32 = 100;
const UPPER_BOUND_RATIO_IF_LINEAR: u32 = (LARGE_INPUT_SIZE / SMALL_INPUT_SIZE) * 3;
const SEPARATOR_CHARS: &[u8] = b"AaBbCcDdEeFfGgHhIiJjKkLlMmNnOoPpQqRrSsTtUuVvWwXxYyZz";

const SYSTEM_CODE_PYTHON: &str = "\
import collections
import copy
import math
import operator
import random
import re
import string
import time

most_recent_input = None

class System(object):
    @classmethod
    def runTest(cls, func, input):
        global most_recent_input
        most_recent_input = copy.deepcopy(input)
        output = func(input)
        return output

    @classmethod
    def extendString(cls, s, length):
        return s * length
";

const BUGGY_MATCHER_PYTHON: &str = "\
def matches_buggy_function(func, ignoredSuiteIds, inputFunctionName, outputFunctionName):
    for task_index, task_inputs in enumerate(all_tasks_test_inputs):
        for suite_index, suite_dict in enumerate(task_inputs):
            if suite_dict[\"id\"] in ignoredSuiteIds:
                continue
            buggy_results = []
            for test_input in suite_dict[\"inputs\"]:
                if inputFunctionName is not None:
                    test_input = inputFunctionName(test_input)
                output = System.runTest(func, test_input)
                if outputFunctionName is not None:
                    output = outputFunctionName(output)
                buggy_results.append(output)
            if buggy_results != correctness_test_results[task_index][suite_index]:
                return False
    return True
";

/// Harness source plus the mapping from harness lines back to raw lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreprocessedCode {
  pub code: String,
  pub separator: String,
  /// `raw_code_line_indexes[i]` is the 0-based raw line of harness line `i`,
  /// or `None` for generated lines.
  pub raw_code_line_indexes: Vec<Option<usize>>,
}

#[derive(Default)]
struct HarnessBuilder {
  lines: Vec<String>,
  origins: Vec<Option<usize>>,
}

impl HarnessBuilder {
  fn generated(&mut self, block: &str) {
    for line in block.split('\n') {
      self.lines.push(line.to_string());
      self.origins.push(None);
    }
  }

  fn from_raw(&mut self, raw_index: usize, line: String) {
    self.lines.push(line);
    self.origins.push(Some(raw_index));
  }

  fn finish(self, separator: String) -> PreprocessedCode {
    PreprocessedCode { code: self.lines.join("\n"), separator, raw_code_line_indexes: self.origins }
  }
}

/// Drops `#` comments from lines without string literals. Line count is preserved.
pub fn naively_strip_comments(code: &str) -> String {
  code
    .split('\n')
    .map(|line| {
      if line.contains('\'') || line.contains('"') {
        return line.to_string();
      }
      match line.find('#') {
        Some(idx) => line[..idx].trim_end().to_string(),
        None => line.to_string(),
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn top_level_function_names(code: &str) -> Vec<String> {
  code
    .split('\n')
    .filter_map(|line| line.strip_prefix("def"))
    .filter_map(|rest| {
      let rest = rest.trim_start();
      let end = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))?;
      rest[end..].trim_start().starts_with('(').then(|| rest[..end].to_string())
    })
    .filter(|name| !name.is_empty())
    .collect()
}

/// Qualifies calls between the learner's top-level functions with
/// `StudentCode().`, leaving each function's own `def` name untouched.
fn add_class_wrapping_to_helper_functions(lines: &[String], function_names: &[String]) -> Vec<String> {
  let patterns: Vec<Regex> = function_names
    .iter()
    .filter_map(|name| Regex::new(&format!(r"(^|[^A-Za-z0-9_.])({}\s*\()", regex::escape(name))).ok())
    .collect();
  let replacement = format!("${{1}}{CLASS_NAME_STUDENT_CODE}().${{2}}");

  lines
    .iter()
    .map(|line| {
      let (head, tail) = match line.trim_start().starts_with("def ") {
        true => match line.find('(') {
          Some(idx) => line.split_at(idx + 1),
          None => (line.as_str(), ""),
        },
        false => ("", line.as_str()),
      };
      let mut tail = tail.to_string();
      for pattern in &patterns {
        tail = pattern.replace_all(&tail, replacement.as_str()).into_owned();
      }
      format!("{head}{tail}")
    })
    .collect()
}

/// Indents every line into the wrapper class and adds `self` to top-level defs.
fn transform_to_instance_methods(code: &str) -> Vec<String> {
  let lines: Vec<String> = code.split('\n').map(str::to_string).collect();
  let wrapped = add_class_wrapping_to_helper_functions(&lines, &top_level_function_names(code));
  wrapped
    .into_iter()
    .map(|line| {
      if line.starts_with("def") {
        if let Some(idx) = line.find('(') {
          let (head, tail) = line.split_at(idx + 1);
          return format!("{START_INDENT}{head}self, {tail}");
        }
      }
      format!("{START_INDENT}{line}")
    })
    .collect()
}

fn generate_separator() -> String {
  let mut rng = rand::thread_rng();
  (0..SEPARATOR_LENGTH)
    .map(|_| SEPARATOR_CHARS[rng.gen_range(0..SEPARATOR_CHARS.len())] as char)
    .collect()
}

fn correctness_test_code(tasks: &[Task]) -> String {
  let all_inputs: Vec<String> = tasks
    .iter()
    .map(|task| {
      let suites: Vec<String> = task
        .test_suites
        .iter()
        .map(|suite| {
          let inputs: Vec<String> = suite.test_cases.iter().map(|c| to_python_literal(&c.input)).collect();
          format!("{{\n        \"id\": {},\n        \"inputs\": [{}],\n    }}", to_python_literal(&suite.id.clone().into()), inputs.join(", "))
        })
        .collect();
      format!("\n    [{}]", suites.join(", "))
    })
    .collect();

  let mut code = format!("{VARNAME_ALL_TASKS_TEST_INPUTS} = [{}\n]\n\n{VARNAME_OBSERVED_OUTPUTS} = []", all_inputs.join(", "));
  for (i, task) in tasks.iter().enumerate() {
    let input = match &task.input_function_name {
      Some(f) => format!("{f}(test_input)"),
      None => "test_input".to_string(),
    };
    let run = format!("System.runTest({CLASS_NAME_STUDENT_CODE}().{}, {input})", task.main_function_name);
    let output = match &task.output_function_name {
      Some(f) => format!("{f}({run})"),
      None => run,
    };
    code.push_str(&format!(
      "\n\ntask_test_inputs = {VARNAME_ALL_TASKS_TEST_INPUTS}[{i}]\n\
       task_results = []\n\
       for suite_dicts in task_test_inputs:\n\
       \x20   suite_results = [\n\
       \x20       {output}\n\
       \x20       for test_input in suite_dicts[\"inputs\"]]\n\
       \x20   task_results.append(suite_results)\n\
       {VARNAME_OBSERVED_OUTPUTS}.append(task_results)"
    ));
  }
  code
}

fn buggy_output_test_code(tasks: &[Task]) -> String {
  let mut code = format!("{BUGGY_MATCHER_PYTHON}\n{VARNAME_BUGGY_OUTPUT_TEST_RESULTS} = []\n");
  for task in tasks {
    code.push_str(&format!("{VARNAME_TASK_BUGGY_OUTPUT_TEST_RESULTS} = []\n"));
    let input_fn = task.input_function_name.as_deref().unwrap_or("None");
    let output_fn = task.output_function_name.as_deref().unwrap_or("None");
    for test in &task.buggy_output_tests {
      let ignored: Vec<String> = test
        .ignored_test_suite_ids
        .iter()
        .map(|id| to_python_literal(&id.clone().into()))
        .collect();
      code.push_str(&format!(
        "{VARNAME_TASK_BUGGY_OUTPUT_TEST_RESULTS}.append(\n    matches_buggy_function({}, [{}], {input_fn}, {output_fn}))\n",
        test.buggy_function_name,
        ignored.join(", ")
      ));
    }
    code.push_str(&format!("{VARNAME_BUGGY_OUTPUT_TEST_RESULTS}.append({VARNAME_TASK_BUGGY_OUTPUT_TEST_RESULTS})\n"));
  }
  code
}

fn performance_test_code(tasks: &[Task]) -> String {
  let mut code = format!(
    "{VARNAME_PERFORMANCE_TEST_RESULTS} = []\n\n\
     def get_test_input(atom, input_size, qualifiedTransformationFunctionName):\n\
     \x20   return qualifiedTransformationFunctionName(atom, input_size)\n\n\
     def run_performance_test(\n\
     \x20       test_input, qualifiedTransformationFunctionName,\n\
     \x20       qualifiedEvaluationFunctionName):\n\
     \x20   time_array = []\n\
     \x20   for input_size in [{SMALL_INPUT_SIZE}, {LARGE_INPUT_SIZE}]:\n\
     \x20       start = time.perf_counter()\n\
     \x20       output = qualifiedEvaluationFunctionName(get_test_input(\n\
     \x20           test_input, input_size, qualifiedTransformationFunctionName))\n\
     \x20       finish = time.perf_counter() - start\n\
     \x20       time_array.append(finish)\n\
     \x20   if time_array[1] > {UPPER_BOUND_RATIO_IF_LINEAR} * time_array[0]:\n\
     \x20       return \"not linear\"\n\
     \x20   return \"linear\"\n"
  );
  for task in tasks {
    code.push_str(&format!("\n{VARNAME_TASK_PERFORMANCE_TEST_RESULTS} = []\n"));
    for test in &task.performance_tests {
      code.push_str(&format!(
        "{VARNAME_TASK_PERFORMANCE_TEST_RESULTS}.append(\n    run_performance_test({}, {}, {CLASS_NAME_STUDENT_CODE}().{}))\n",
        to_python_literal(&test.input_data_atom),
        test.transformation_function_name,
        test.evaluation_function_name
      ));
    }
    code.push_str(&format!("{VARNAME_PERFORMANCE_TEST_RESULTS}.append({VARNAME_TASK_PERFORMANCE_TEST_RESULTS})\n"));
  }
  code
}

fn response_dict_prelude() -> String {
  [VARNAME_MOST_RECENT_INPUT, VARNAME_PERFORMANCE_TEST_RESULTS, VARNAME_OBSERVED_OUTPUTS, VARNAME_BUGGY_OUTPUT_TEST_RESULTS]
    .iter()
    .fold("response_dict = {}".to_string(), |acc, name| format!("{acc}\n{name} = None"))
}

fn response_dict_epilogue() -> String {
  [VARNAME_MOST_RECENT_INPUT, VARNAME_PERFORMANCE_TEST_RESULTS, VARNAME_OBSERVED_OUTPUTS, VARNAME_BUGGY_OUTPUT_TEST_RESULTS]
    .iter()
    .map(|name| format!("response_dict['{name}'] = {name}"))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Builds the full harness for `raw_code` against every task of a question.
#[instrument(level = "debug", skip(raw_code, auxiliary_code, tasks), fields(code_len = raw_code.len(), tasks = tasks.len()))]
pub fn preprocess(raw_code: &str, auxiliary_code: &str, tasks: &[Task]) -> PreprocessedCode {
  let separator = generate_separator();
  let mut harness = HarnessBuilder::default();

  harness.generated(&response_dict_prelude());
  harness.generated(SYSTEM_CODE_PYTHON);
  harness.generated(&format!("class {CLASS_NAME_STUDENT_CODE}(object):"));
  for (i, line) in transform_to_instance_methods(&naively_strip_comments(raw_code)).into_iter().enumerate() {
    harness.from_raw(i, line);
  }
  harness.generated("");
  harness.generated(
    &[
      auxiliary_code.to_string(),
      format!("separator = \"{separator}\"\n"),
      correctness_test_code(tasks),
      buggy_output_test_code(tasks),
      performance_test_code(tasks),
    ]
    .join("\n\n"),
  );
  harness.generated(&response_dict_epilogue());

  let preprocessed = harness.finish(separator);
  debug!(target: "runner", lines = preprocessed.raw_code_line_indexes.len(), "Harness generated");
  preprocessed
}
