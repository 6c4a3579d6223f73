// ==========================================
// 测试数据生成器
// ==========================================
// 用途: 生成9个测试数据集CSV文件
// 输出: tests/fixtures/datasets/*.csv
// ==========================================

use csv::Writer;
use std::error::Error;
use std::fs::File;

// 销售明细 CSV 表头（中文列名）
const SALES_HEADER: &[&str] = &[
    "门店编码",
    "品类编码",
    "子类编码",
    "单品编码",
    "报告期",
    "销售额",
    "综合销量",
    "正价销量",
    "促销销量",
    "出库销量",
];

// 聚类分配 CSV 表头
const CLUSTER_HEADER: &[&str] = &["门店编码", "聚类编号", "店群编号", "报告期"];

// 销售行结构(全部保持字符串,便于制造缺失/脏值)
#[derive(Clone)]
struct SalesRow {
    store_code: String,
    cat_code: String,
    subcat_code: String,
    spu_code: String,
    period: String,
    sales_amt: String,
    total_qty: String,
    base_qty: String,
    promo_qty: String,
    ship_qty: String,
}

impl SalesRow {
    fn to_row(&self) -> Vec<String> {
        vec![
            self.store_code.clone(),
            self.cat_code.clone(),
            self.subcat_code.clone(),
            self.spu_code.clone(),
            self.period.clone(),
            self.sales_amt.clone(),
            self.total_qty.clone(),
            self.base_qty.clone(),
            self.promo_qty.clone(),
            self.ship_qty.clone(),
        ]
    }
}

// 生成正常销售记录(四个销量源齐全且自洽)
fn generate_normal_record(index: usize) -> SalesRow {
    let store = format!("S{:03}", (index % 20) + 1);
    let cat_no = (index % 4) + 1;
    let cat = format!("C{}0", cat_no);
    let subcat = format!("{}-{:02}", cat, (index % 3) + 1);
    let spu = format!("SPU{:05}", (index % 50) + 1);

    let base = 5 + (index % 40) as i64;
    let promo = (index % 6) as i64;
    let total = base + promo;
    let price = 30.0 + (index % 7) as f64 * 5.0;

    SalesRow {
        store_code: store,
        cat_code: cat,
        subcat_code: subcat,
        spu_code: spu,
        period: "202506".to_string(),
        sales_amt: format!("{:.2}", total as f64 * price),
        total_qty: format!("{}", total),
        base_qty: format!("{}", base),
        promo_qty: format!("{}", promo),
        ship_qty: format!("{}", total),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("开始生成测试数据集...");

    std::fs::create_dir_all("tests/fixtures/datasets")?;

    // 1. 生成正常数据 (100条)
    generate_normal_data()?;

    // 2. 生成大数据集 (1000条)
    generate_large_dataset()?;

    // 3. 生成仅有金额的数据(销量四源全缺)
    generate_amount_only()?;

    // 4. 生成批次内重复数据
    generate_duplicate_keys()?;

    // 5. 生成缺失必填字段数据
    generate_missing_required_fields()?;

    // 6. 生成数据类型错误数据
    generate_invalid_data_types()?;

    // 7. 生成混合问题数据(负值/销量不自洽)
    generate_mixed_issues()?;

    // 8. 生成历史别名表头数据
    generate_alias_headers()?;

    // 9. 生成聚类分配数据(双列名变体)
    generate_clusters()?;

    println!("✓ 所有测试数据集生成完成！");
    Ok(())
}

fn generate_normal_data() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/01_normal_sales.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    for i in 0..100 {
        let record = generate_normal_record(i);
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 01_normal_sales.csv (100条)");
    Ok(())
}

fn generate_large_dataset() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/02_large_sales.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    for i in 0..1000 {
        let record = generate_normal_record(i + 10000); // 避免与其他数据集键冲突
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 02_large_sales.csv (1000条)");
    Ok(())
}

fn generate_amount_only() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/03_amount_only.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    // 只有销售额,四个销量源整体缺失(检测器应跳过这些行,绝不由金额折算件数)
    for i in 0..20 {
        let mut record = generate_normal_record(i + 20000);
        record.total_qty = "".to_string();
        record.base_qty = "".to_string();
        record.promo_qty = "".to_string();
        record.ship_qty = "".to_string();
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 03_amount_only.csv (20条,仅金额)");
    Ok(())
}

fn generate_duplicate_keys() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/04_duplicate_keys.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    // 生成15条记录
    for i in 0..15 {
        let record = generate_normal_record(i + 30000);
        wtr.write_record(&record.to_row())?;
    }

    // 添加5条 (门店,单品,报告期) 重复记录
    for i in [0, 3, 6, 9, 12] {
        let record = generate_normal_record(i + 30000);
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 04_duplicate_keys.csv (20条,含5组重复键)");
    Ok(())
}

fn generate_missing_required_fields() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/05_missing_required.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    // 缺失门店编码
    for i in 0..3 {
        let mut record = generate_normal_record(i + 40000);
        record.store_code = "".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 缺失品类编码
    for i in 0..3 {
        let mut record = generate_normal_record(i + 40003);
        record.cat_code = "".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 缺失报告期
    for i in 0..3 {
        let mut record = generate_normal_record(i + 40006);
        record.period = "".to_string();
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 05_missing_required.csv (9条,缺失必填字段)");
    Ok(())
}

fn generate_invalid_data_types() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/06_invalid_types.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    // 销售额包含非数字字符
    for i in 0..3 {
        let mut record = generate_normal_record(i + 50000);
        record.sales_amt = "ABC".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 综合销量包含非数字字符
    for i in 0..3 {
        let mut record = generate_normal_record(i + 50003);
        record.total_qty = "NOT_A_NUMBER".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 报告期格式非法
    for i in 0..3 {
        let mut record = generate_normal_record(i + 50006);
        record.period = "202513".to_string();
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 06_invalid_types.csv (9条,数据类型错误)");
    Ok(())
}

fn generate_mixed_issues() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/07_mixed_issues.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(SALES_HEADER)?;

    // 正常数据 (10条)
    for i in 0..10 {
        let record = generate_normal_record(i + 60000);
        wtr.write_record(&record.to_row())?;
    }

    // 负销售额 (3条)
    for i in 0..3 {
        let mut record = generate_normal_record(i + 60010);
        record.sales_amt = "-120.0".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 负销量 (3条)
    for i in 0..3 {
        let mut record = generate_normal_record(i + 60013);
        record.total_qty = "-5".to_string();
        wtr.write_record(&record.to_row())?;
    }

    // 综合销量 ≠ 正价+促销 (3条,应产生 WARNING 不阻断)
    for i in 0..3 {
        let mut record = generate_normal_record(i + 60016);
        record.total_qty = "100".to_string();
        record.base_qty = "10".to_string();
        record.promo_qty = "5".to_string();
        wtr.write_record(&record.to_row())?;
    }

    wtr.flush()?;
    println!("✓ 生成 07_mixed_issues.csv (19条,混合问题)");
    Ok(())
}

fn generate_alias_headers() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/08_alias_headers.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    // 历史系统导出列名: 门店代码/品类代码/年月/销售金额/总销量
    wtr.write_record(["门店代码", "品类代码", "单品编码", "年月", "销售金额", "总销量"])?;

    for i in 0..10 {
        let record = generate_normal_record(i + 70000);
        wtr.write_record([
            record.store_code.as_str(),
            record.cat_code.as_str(),
            record.spu_code.as_str(),
            "2025-06",
            record.sales_amt.as_str(),
            record.total_qty.as_str(),
        ])?;
    }

    wtr.flush()?;
    println!("✓ 生成 08_alias_headers.csv (10条,历史别名表头)");
    Ok(())
}

fn generate_clusters() -> Result<(), Box<dyn Error>> {
    let path = "tests/fixtures/datasets/09_clusters.csv";
    let file = File::create(path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(CLUSTER_HEADER)?;

    // 前10家门店带双列(聚类编号优先)
    for i in 0..10 {
        let store = format!("S{:03}", i + 1);
        let cluster = format!("CL-{:02}", (i % 4) + 1);
        let group = format!("G{:02}", (i % 4) + 1);
        wtr.write_record([store.as_str(), cluster.as_str(), group.as_str(), "202506"])?;
    }

    // 5家仅有聚类编号
    for i in 10..15 {
        let store = format!("S{:03}", i + 1);
        let cluster = format!("CL-{:02}", (i % 4) + 1);
        wtr.write_record([store.as_str(), cluster.as_str(), "", "202506"])?;
    }

    // 5家仅有历史列店群编号(导入器应派生为聚类)
    for i in 15..20 {
        let store = format!("S{:03}", i + 1);
        let group = format!("G{:02}", (i % 4) + 1);
        wtr.write_record([store.as_str(), "", group.as_str(), "202506"])?;
    }

    wtr.flush()?;
    println!("✓ 生成 09_clusters.csv (20条,双列名变体)");
    Ok(())
}
