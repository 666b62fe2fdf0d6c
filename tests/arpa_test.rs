mod common;

use common::*;
use fslm::{from_arpa, from_arpa_file, Model};

#[test]
fn scores_the_simple_trigram_from_a_file() {
    let builder = from_arpa_file("testdata/simple.3gram.arpa").unwrap();
    let model = builder.dump_hashed(0.0);
    check_model(&model);
    check_sents(&model, SIMPLE_TRIGRAM_SENTS);
}

#[test]
fn scores_the_simple_trigram_from_a_messy_file() {
    let builder = from_arpa_file("testdata/messy.3gram.arpa").unwrap();
    let model = builder.dump_sorted();
    check_model(&model);
    check_sents(&model, SIMPLE_TRIGRAM_SENTS);
}

#[test]
fn arpa_and_direct_builds_agree() {
    let from_text = from_arpa_file("testdata/simple.3gram.arpa")
        .unwrap()
        .dump_sorted();
    let direct = ready_builder(SIMPLE_TRIGRAM_LM).dump_sorted();
    assert_identical(&direct, &from_text);
}

#[test]
fn parses_from_any_buffered_reader() {
    let text = "\\data\\\n\
                ngram 1=3\n\
                ngram 2=1\n\
                \n\
                \\1-grams:\n\
                -99\t<s>\t-1\n\
                0.1\t</s>\n\
                \\2-grams:\n\
                -1\t<s> a\n\
                \n\
                \\end\\\n";
    let model = from_arpa(text.as_bytes()).unwrap().dump_hashed(0.0);
    check_model(&model);
    let (_, w) = model.next(model.start(), "a");
    assert!((w - -1.0).abs() < FLOAT_TOL);
}
